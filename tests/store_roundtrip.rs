mod common;

use chrono::NaiveDate;

use common::day;
use formcast::features::{FEATURE_COUNT, FeatureVector};
use formcast::ingest::{RawStatLine, normalize_matches};
use formcast::model::{Confidence, FixtureId, Outcome, Prob3, TeamId};
use formcast::predict::Prediction;
use formcast::store::{self, FixtureRow, IngestRunStats, StatisticsRow};
use formcast::tracking::{score_prediction, summarize_accuracy};

const LEAGUE: u32 = 39;

fn row(id: i64, d: i64, home: i64, away: i64, score: Option<(i64, i64)>) -> FixtureRow {
    let (home_goals, away_goals, result, status) = match score {
        Some((h, a)) => {
            let code = if h > a {
                "H"
            } else if h < a {
                "A"
            } else {
                "D"
            };
            (Some(h), Some(a), Some(code.to_string()), "FT")
        }
        None => (None, None, None, "NS"),
    };
    FixtureRow {
        fixture_id: id,
        league_id: LEAGUE,
        season: Some(2024),
        kickoff: day(d).timestamp(),
        home_team_id: home,
        away_team_id: away,
        home_team: format!("Team {home}"),
        away_team: format!("Team {away}"),
        home_goals,
        away_goals,
        result,
        venue: None,
        status: status.to_string(),
    }
}

fn prediction(fixture_id: u64, d: i64, probs: Prob3) -> Prediction {
    Prediction {
        fixture_id: FixtureId(fixture_id),
        kickoff: day(d),
        home_name: "Home".to_string(),
        away_name: "Away".to_string(),
        predicted: probs.argmax(),
        confidence: Confidence::from_max_prob(probs.max()),
        probs,
        model_version: "test".to_string(),
        features: FeatureVector::from_array([0.0; FEATURE_COUNT]),
    }
}

fn seeded() -> rusqlite::Connection {
    let mut conn = store::open_in_memory().expect("in-memory db");
    store::upsert_fixtures(
        &mut conn,
        &[
            row(1, 0, 10, 20, Some((2, 1))),
            row(2, 7, 20, 30, Some((0, 3))),
            row(3, 40, 10, 30, None),
        ],
    )
    .expect("fixtures upsert");
    store::upsert_statistics(
        &mut conn,
        &[StatisticsRow {
            fixture_id: 1,
            home: RawStatLine {
                shots: Some(14),
                shots_on_target: Some(6),
                possession: Some(58.0),
                corners: Some(7),
            },
            away: RawStatLine {
                shots: Some(8),
                shots_on_target: None,
                possession: Some(42.0),
                corners: Some(2),
            },
        }],
    )
    .expect("statistics upsert");
    conn
}

#[test]
fn stored_rows_normalize_into_matches() {
    let conn = seeded();
    let raw = store::load_raw_matches(&conn, LEAGUE).expect("load matches");
    assert_eq!(raw.len(), 3);

    let normalized = normalize_matches(raw);
    assert_eq!(normalized.matches.len(), 2);
    assert_eq!(normalized.pending, 1);
    assert!(normalized.rejected.is_empty());

    let first = &normalized.matches[0];
    assert_eq!(first.id, FixtureId(1));
    assert_eq!(first.home_team, TeamId(10));
    assert!(first.home_stats.enriched);
    assert_eq!(first.home_stats.shots, 14);
    assert_eq!(first.away_stats.shots_on_target, 0);
    assert_eq!(first.away_stats.possession, Some(42.0));

    let second = &normalized.matches[1];
    assert_eq!(second.outcome(), Outcome::Away);
    assert!(!second.home_stats.enriched);
    assert_eq!(second.home_stats.possession, None);
}

#[test]
fn upserts_replace_instead_of_duplicating() {
    let mut conn = seeded();
    assert_eq!(
        store::fixtures_missing_statistics(&conn, LEAGUE, Some(2024)).expect("query"),
        vec![2]
    );

    // Fixture 3 gets played.
    store::upsert_fixtures(&mut conn, &[row(3, 40, 10, 30, Some((1, 1)))]).expect("update");
    let raw = store::load_raw_matches(&conn, LEAGUE).expect("load matches");
    assert_eq!(raw.len(), 3);
    let stored = store::load_fixture(&conn, 3).expect("query").expect("fixture 3 exists");
    assert_eq!(stored.result.as_deref(), Some("D"));
    assert!(stored.is_completed());
    assert_eq!(
        store::fixtures_missing_statistics(&conn, LEAGUE, None).expect("query"),
        vec![2, 3]
    );
    assert!(store::load_fixture(&conn, 99).expect("query").is_none());
}

#[test]
fn upcoming_window_only_returns_unplayed_fixtures() {
    let conn = seeded();
    let upcoming = store::load_upcoming_fixtures(&conn, LEAGUE, day(30), day(50)).expect("query");
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, FixtureId(3));
    assert_eq!(upcoming[0].away_team, TeamId(30));

    let none = store::load_upcoming_fixtures(&conn, LEAGUE, day(0), day(30)).expect("query");
    assert!(none.is_empty());
}

#[test]
fn predictions_are_tracked_once() {
    let conn = seeded();
    let today = NaiveDate::from_ymd_opt(2024, 8, 1).expect("valid date");
    let later = NaiveDate::from_ymd_opt(2024, 8, 2).expect("valid date");
    let first = Prob3 {
        home: 0.4,
        draw: 0.3,
        away: 0.3,
    };
    let revised = Prob3 {
        home: 0.65,
        draw: 0.2,
        away: 0.15,
    };
    store::save_prediction(&conn, &prediction(1, 0, first), today).expect("save");
    store::save_prediction(&conn, &prediction(1, 0, first), today).expect("same-day rerun");
    store::save_prediction(&conn, &prediction(1, 0, revised), later).expect("next day");
    store::save_prediction(&conn, &prediction(3, 40, first), today).expect("save upcoming");

    let pending = store::load_untracked_predictions(&conn, day(20), 10).expect("query");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].fixture_id, FixtureId(1));
    assert_eq!(pending[0].probs, revised);
    assert_eq!(pending[0].confidence, Confidence::High);

    let record = score_prediction(&pending[0], Outcome::Home, day(21));
    assert!(record.correct);
    assert!(store::save_accuracy(&conn, &record).expect("save accuracy"));
    assert!(!store::save_accuracy(&conn, &record).expect("second save is a no-op"));
    assert!(
        store::load_untracked_predictions(&conn, day(20), 10)
            .expect("query")
            .is_empty()
    );

    let records = store::load_accuracy_records(&conn).expect("query");
    assert_eq!(records, vec![record]);
    let summary = summarize_accuracy(&records);
    assert_eq!(summary.overall.total, 1);
    assert_eq!(summary.by_confidence[&Confidence::High].correct, 1);
}

#[test]
fn void_fixtures_do_not_hold_tracking_slots() {
    let mut conn = seeded();
    let mut cancelled = row(4, -5, 30, 10, None);
    cancelled.status = "CANC".to_string();
    let mut abandoned = row(5, -3, 20, 10, None);
    abandoned.status = "ABD".to_string();
    store::upsert_fixtures(&mut conn, &[cancelled, abandoned]).expect("upsert");

    let today = NaiveDate::from_ymd_opt(2024, 8, 1).expect("valid date");
    for (id, d) in [(4, -5), (5, -3), (1, 0)] {
        store::save_prediction(&conn, &prediction(id, d, Prob3::uniform()), today).expect("save");
    }

    let pending = store::load_untracked_predictions(&conn, day(20), 1).expect("query");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].fixture_id, FixtureId(1));
}

#[test]
fn ingest_runs_are_recorded() {
    let conn = seeded();
    let run_id = store::begin_ingest_run(&conn, LEAGUE, 2024).expect("begin");
    let stats = IngestRunStats {
        fixtures_upserted: 3,
        statistics_upserted: 1,
        errors: vec!["statistics 2: timeout".to_string()],
    };
    store::finish_ingest_run(&conn, run_id, &stats).expect("finish");

    let (fixtures, errors): (i64, String) = conn
        .query_row(
            "SELECT fixtures_upserted, errors_json FROM ingest_runs WHERE run_id = ?1",
            [run_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("run row");
    assert_eq!(fixtures, 3);
    assert!(errors.contains("timeout"));
}
