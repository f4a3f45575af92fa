use anyhow::{Result, anyhow};
use chrono::Utc;

use formcast::classifier::{ClassifierSpec, EmpiricalBaseline, ModelArtifact};
use formcast::cli;
use formcast::config::AppConfig;
use formcast::export::write_training_parquet;
use formcast::ingest::normalize_matches;
use formcast::model::Prob3;
use formcast::scaler::StandardScaler;
use formcast::store;
use formcast::tracking::evaluate_probs;
use formcast::training::build_training_set;

fn main() -> Result<()> {
    cli::init_logging();
    let cfg = AppConfig::load()?;

    let db_path = cli::path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());
    let out_path = cli::path_arg("--out")
        .unwrap_or_else(|| cfg.data_dir.join("training_features.parquet"));
    let scaler_path =
        cli::path_arg("--scaler").unwrap_or_else(|| out_path.with_extension("scaler.json"));
    let write_baseline = cli::has_flag("--baseline");
    let model_path = cli::path_arg("--model").unwrap_or_else(|| cfg.model_path.clone());

    let conn = store::open_db(&db_path)?;
    let raw = store::load_raw_matches(&conn, cfg.league_id)?;
    let normalized = normalize_matches(raw);
    log::info!(
        "{} completed matches, {} pending, {} rejected",
        normalized.matches.len(),
        normalized.pending,
        normalized.rejected.len()
    );

    let set = build_training_set(
        &normalized.matches,
        cfg.lookback,
        &cfg.stats_policy,
        cfg.min_prior_matches,
    );
    if set.rows.is_empty() {
        return Err(anyhow!(
            "no training rows could be built from {} (ingest more history first)",
            db_path.display()
        ));
    }

    let written = write_training_parquet(&out_path, &set)?;
    let scaler = StandardScaler::fit(&set.features())?;
    scaler.save(&scaler_path)?;

    let outcomes = set.outcomes();
    let baseline = EmpiricalBaseline::from_outcomes(&outcomes);
    let baseline_metrics = evaluate_probs(&vec![baseline.probs; outcomes.len()], &outcomes);

    println!("Training matrix written");
    println!("Rows: {written} -> {}", out_path.display());
    println!("Scaler: {}", scaler_path.display());
    println!(
        "Skipped: {} warm-up, {} without enough team history",
        set.skipped_warmup, set.skipped_insufficient
    );
    print_rates("Outcome base rates", baseline.probs);
    println!(
        "Base-rate baseline: brier={:.4} logloss={:.4} acc={:.3}",
        baseline_metrics.brier, baseline_metrics.log_loss, baseline_metrics.accuracy
    );

    if write_baseline {
        let version = format!("baseline-{}", Utc::now().format("%Y%m%d"));
        let artifact = ModelArtifact::new(
            version,
            cfg.lookback,
            scaler,
            ClassifierSpec::Baseline(baseline),
        );
        artifact.save(&model_path)?;
        println!("Baseline model artifact: {}", model_path.display());
    }
    Ok(())
}

fn print_rates(title: &str, p: Prob3) {
    println!(
        "{title}: home={:.3} draw={:.3} away={:.3}",
        p.home, p.draw, p.away
    );
}
