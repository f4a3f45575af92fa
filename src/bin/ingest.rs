use anyhow::{Context, Result};

use formcast::api_football::ApiFootball;
use formcast::cli;
use formcast::config::AppConfig;
use formcast::http_client::http_client;
use formcast::store::{self, IngestRunStats, StatisticsRow};

const STATS_BATCH: usize = 25;

fn main() -> Result<()> {
    cli::init_logging();
    let cfg = AppConfig::load()?;

    let season = match cli::arg_value("--season") {
        Some(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("invalid --season {raw:?}"))?,
        None => cfg.require_season()?,
    };
    let db_path = cli::path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());
    let skip_stats = cli::has_flag("--skip-stats");
    let max_stats = match cli::arg_value("--max-stats") {
        Some(raw) => Some(
            raw.parse::<usize>()
                .with_context(|| format!("invalid --max-stats {raw:?}"))?,
        ),
        None => None,
    };

    let api = ApiFootball::new(
        http_client()?,
        cfg.api_base.clone(),
        cfg.require_api_key()?,
        cfg.request_delay,
    );
    let mut conn = store::open_db(&db_path)?;
    let run_id = store::begin_ingest_run(&conn, cfg.league_id, season)?;
    let mut stats = IngestRunStats::default();

    log::info!("fetching league {} season {season}", cfg.league_id);
    match api.season_fixtures(cfg.league_id, season) {
        Ok(rows) => {
            let completed = rows.iter().filter(|r| r.is_completed()).count();
            stats.fixtures_upserted = store::upsert_fixtures(&mut conn, &rows)?;
            log::info!("stored {} fixtures ({completed} completed)", rows.len());
        }
        Err(err) => {
            log::error!("fixture fetch failed: {err:#}");
            stats.errors.push(format!("fixtures: {err:#}"));
        }
    }

    if !skip_stats {
        let mut missing = store::fixtures_missing_statistics(&conn, cfg.league_id, Some(season))?;
        if let Some(max) = max_stats {
            missing.truncate(max);
        }
        log::info!("enriching {} fixtures with match statistics", missing.len());

        let mut batch: Vec<StatisticsRow> = Vec::with_capacity(STATS_BATCH);
        for (idx, fixture_id) in missing.iter().enumerate() {
            let Some(fixture) = store::load_fixture(&conn, *fixture_id)? else {
                continue;
            };
            match api.fixture_statistics(*fixture_id, fixture.home_team_id) {
                Ok(Some(row)) => batch.push(row),
                Ok(None) => log::debug!("no statistics yet for fixture {fixture_id}"),
                Err(err) => {
                    log::warn!("statistics for fixture {fixture_id} failed: {err:#}");
                    stats.errors.push(format!("statistics {fixture_id}: {err:#}"));
                }
            }
            if batch.len() >= STATS_BATCH {
                stats.statistics_upserted += store::upsert_statistics(&mut conn, &batch)?;
                batch.clear();
            }
            if (idx + 1) % 50 == 0 {
                log::info!("processed {}/{} fixtures", idx + 1, missing.len());
            }
        }
        if !batch.is_empty() {
            stats.statistics_upserted += store::upsert_statistics(&mut conn, &batch)?;
        }
    }

    store::finish_ingest_run(&conn, run_id, &stats)?;

    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    println!("League: {} season {season}", cfg.league_id);
    println!("Fixtures upserted: {}", stats.fixtures_upserted);
    println!("Statistics upserted: {}", stats.statistics_upserted);
    if !stats.errors.is_empty() {
        println!("Errors: {}", stats.errors.len());
        for err in stats.errors.iter().take(6) {
            println!("  - {err}");
        }
    }
    Ok(())
}
