use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use formcast::api_football::ApiFootball;
use formcast::classifier::ModelArtifact;
use formcast::cli;
use formcast::config::AppConfig;
use formcast::http_client::http_client;
use formcast::ingest::normalize_matches;
use formcast::predict::{Prediction, predict_fixtures};
use formcast::store;

fn main() -> Result<()> {
    cli::init_logging();
    let cfg = AppConfig::load()?;

    let db_path = cli::path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());
    let model_path = cli::path_arg("--model").unwrap_or_else(|| cfg.model_path.clone());
    let refresh = cli::has_flag("--refresh");
    let dry_run = cli::has_flag("--dry-run");

    let artifact = ModelArtifact::load(&model_path)?;
    log::info!(
        "model {} ({} features, lookback {})",
        artifact.model_version,
        artifact.feature_names.len(),
        artifact.lookback.get()
    );

    let mut conn = store::open_db(&db_path)?;
    let now = Utc::now();
    let until = now + Duration::days(cfg.upcoming_days);

    if refresh {
        let season = cfg.require_season()?;
        let api = ApiFootball::new(
            http_client()?,
            cfg.api_base.clone(),
            cfg.require_api_key()?,
            cfg.request_delay,
        );
        let rows = api
            .upcoming_fixtures(cfg.league_id, season, now.date_naive(), until.date_naive())
            .context("refresh upcoming fixtures")?;
        let stored = store::upsert_fixtures(&mut conn, &rows)?;
        log::info!("refreshed {stored} upcoming fixtures");
    }

    let history = normalize_matches(store::load_raw_matches(&conn, cfg.league_id)?);
    let fixtures = store::load_upcoming_fixtures(&conn, cfg.league_id, now, until)?;
    if fixtures.is_empty() {
        println!("No upcoming fixtures in the next {} days", cfg.upcoming_days);
        return Ok(());
    }

    let run = predict_fixtures(
        &artifact,
        &history.matches,
        &fixtures,
        cfg.lookback,
        &cfg.stats_policy,
    )?;

    if !dry_run {
        let today = now.date_naive();
        for prediction in &run.predictions {
            store::save_prediction(&conn, prediction, today)?;
        }
    }

    println!(
        "Predictions: {} scored, {} skipped (insufficient history)",
        run.predictions.len(),
        run.skipped.len()
    );
    for prediction in &run.predictions {
        print_prediction(prediction);
    }
    if dry_run {
        println!("(dry run, nothing stored)");
    }
    Ok(())
}

fn print_prediction(p: &Prediction) {
    println!(
        "{} {:<22} vs {:<22} H={:.3} D={:.3} A={:.3} -> {} ({})",
        p.kickoff.format("%Y-%m-%d %H:%M"),
        p.home_name,
        p.away_name,
        p.probs.home,
        p.probs.draw,
        p.probs.away,
        p.predicted.label(),
        p.confidence
    );
}
