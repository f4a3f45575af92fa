use anyhow::Result;
use chrono::Utc;

use formcast::api_football::{ApiFootball, is_void_status};
use formcast::cli;
use formcast::config::AppConfig;
use formcast::http_client::http_client;
use formcast::model::Outcome;
use formcast::store;
use formcast::tracking::{
    AccuracyRecord, calibration_bins, evaluate_probs, score_prediction, summarize_accuracy,
};

const DEFAULT_LIMIT: usize = 50;

fn main() -> Result<()> {
    cli::init_logging();
    let cfg = AppConfig::load()?;

    let db_path = cli::path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());
    let limit = cli::arg_value("--limit")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIMIT);
    let report_only = cli::has_flag("--report-only");

    let mut conn = store::open_db(&db_path)?;

    if !report_only {
        let api = ApiFootball::new(
            http_client()?,
            cfg.api_base.clone(),
            cfg.require_api_key()?,
            cfg.request_delay,
        );
        let now = Utc::now();
        let pending = store::load_untracked_predictions(&conn, now, limit)?;
        log::info!("{} predictions awaiting results", pending.len());

        let mut scored = 0usize;
        let mut waiting = 0usize;
        for prediction in &pending {
            let fixture_id = prediction.fixture_id.0 as i64;
            let row = match api.fixture(cfg.league_id, fixture_id) {
                Ok(Some(row)) => row,
                Ok(None) => {
                    log::warn!("fixture {fixture_id} not found upstream");
                    continue;
                }
                Err(err) => {
                    log::warn!("fixture {fixture_id} lookup failed: {err:#}");
                    continue;
                }
            };
            store::upsert_fixtures(&mut conn, std::slice::from_ref(&row))?;
            if is_void_status(&row.status) {
                log::info!("fixture {fixture_id} ended as {}, not scored", row.status);
                continue;
            }

            let Some(actual) = row.result.as_deref().and_then(Outcome::from_code) else {
                waiting += 1;
                continue;
            };
            let record = score_prediction(prediction, actual, Utc::now());
            if store::save_accuracy(&conn, &record)? {
                scored += 1;
                log::info!(
                    "{} vs {}: predicted {}, actual {} ({})",
                    row.home_team,
                    row.away_team,
                    record.predicted.label(),
                    record.actual.label(),
                    if record.correct { "correct" } else { "wrong" }
                );
            }
        }
        println!("Scored {scored} predictions, {waiting} still awaiting a result");
    }

    let records = store::load_accuracy_records(&conn)?;
    print_report(&records);
    Ok(())
}

fn print_report(records: &[AccuracyRecord]) {
    if records.is_empty() {
        println!("No tracked predictions yet");
        return;
    }
    let summary = summarize_accuracy(records);
    println!(
        "Overall: {}/{} correct ({:.1}%), mean brier {:.4}",
        summary.overall.correct,
        summary.overall.total,
        summary.overall.accuracy * 100.0,
        summary.mean_brier
    );
    for (confidence, bucket) in &summary.by_confidence {
        println!(
            "  {confidence:<6} {}/{} ({:.1}%)",
            bucket.correct,
            bucket.total,
            bucket.accuracy * 100.0
        );
    }

    let probs: Vec<_> = records.iter().map(|r| r.probs).collect();
    let outcomes: Vec<_> = records.iter().map(|r| r.actual).collect();
    let metrics = evaluate_probs(&probs, &outcomes);
    println!("Log loss: {:.4}", metrics.log_loss);

    println!("Home-win calibration:");
    for bin in calibration_bins(&probs, &outcomes, Outcome::Home, 5) {
        if bin.count == 0 {
            continue;
        }
        println!(
            "  {:.1}-{:.1}: n={:<4} predicted={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }
}
