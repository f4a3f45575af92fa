//! SQLite persistence: fixtures, per-side statistics, predictions and the
//! accuracy ledger.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::ingest::{RawMatch, RawStatLine};
use crate::model::{Confidence, Fixture, FixtureId, Outcome, Prob3, TeamId};
use crate::predict::Prediction;
use crate::tracking::{AccuracyRecord, PendingPrediction};

/// A fixture row as stored; scores and result stay null until the match is completed.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureRow {
    pub fixture_id: i64,
    pub league_id: u32,
    pub season: Option<i64>,
    /// Unix seconds.
    pub kickoff: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<i64>,
    pub away_goals: Option<i64>,
    pub result: Option<String>,
    pub venue: Option<String>,
    pub status: String,
}

impl FixtureRow {
    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    /// `None` when the ids or kickoff cannot form a valid fixture.
    pub fn to_fixture(&self) -> Option<Fixture> {
        Some(Fixture {
            id: FixtureId(u64::try_from(self.fixture_id).ok()?),
            kickoff: DateTime::<Utc>::from_timestamp(self.kickoff, 0)?,
            season: self.season.and_then(|s| u16::try_from(s).ok()),
            home_team: TeamId(u32::try_from(self.home_team_id).ok()?),
            away_team: TeamId(u32::try_from(self.away_team_id).ok()?),
            home_name: self.home_team.clone(),
            away_name: self.away_team.clone(),
            venue: self.venue.clone(),
            status: self.status.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    pub fixture_id: i64,
    pub home: RawStatLine,
    pub away: RawStatLine,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestRunStats {
    pub fixtures_upserted: usize,
    pub statistics_upserted: usize,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season INTEGER NULL,
            kickoff INTEGER NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            result TEXT NULL,
            venue TEXT NULL,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_league ON fixtures(league_id);
        CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff);

        CREATE TABLE IF NOT EXISTS match_statistics (
            fixture_id INTEGER PRIMARY KEY REFERENCES fixtures(fixture_id) ON DELETE CASCADE,
            home_shots INTEGER NULL,
            away_shots INTEGER NULL,
            home_shots_on_target INTEGER NULL,
            away_shots_on_target INTEGER NULL,
            home_possession REAL NULL,
            away_possession REAL NULL,
            home_corners INTEGER NULL,
            away_corners INTEGER NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id INTEGER NOT NULL REFERENCES fixtures(fixture_id) ON DELETE CASCADE,
            prediction_date TEXT NOT NULL,
            home_win_prob REAL NOT NULL,
            draw_prob REAL NOT NULL,
            away_win_prob REAL NOT NULL,
            predicted_result TEXT NOT NULL,
            confidence TEXT NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(fixture_id, prediction_date)
        );

        CREATE TABLE IF NOT EXISTS prediction_accuracy (
            fixture_id INTEGER PRIMARY KEY REFERENCES fixtures(fixture_id) ON DELETE CASCADE,
            predicted_result TEXT NOT NULL,
            actual_result TEXT NOT NULL,
            was_correct INTEGER NOT NULL,
            predicted_home_prob REAL NOT NULL,
            predicted_draw_prob REAL NOT NULL,
            predicted_away_prob REAL NOT NULL,
            confidence TEXT NOT NULL,
            brier REAL NOT NULL,
            tracked_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            fixtures_upserted INTEGER NOT NULL,
            statistics_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_fixtures(conn: &mut Connection, rows: &[FixtureRow]) -> Result<usize> {
    let tx = conn.transaction().context("begin fixture transaction")?;
    let now = Utc::now().to_rfc3339();
    for row in rows {
        tx.execute(
            r#"
            INSERT INTO fixtures (
                fixture_id, league_id, season, kickoff,
                home_team_id, away_team_id, home_team, away_team,
                home_goals, away_goals, result, venue, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(fixture_id) DO UPDATE SET
                league_id = excluded.league_id,
                season = excluded.season,
                kickoff = excluded.kickoff,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                home_team = excluded.home_team,
                away_team = excluded.away_team,
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                result = excluded.result,
                venue = COALESCE(excluded.venue, fixtures.venue),
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
            params![
                row.fixture_id,
                row.league_id as i64,
                row.season,
                row.kickoff,
                row.home_team_id,
                row.away_team_id,
                row.home_team,
                row.away_team,
                row.home_goals,
                row.away_goals,
                row.result,
                row.venue,
                row.status,
                now,
            ],
        )
        .with_context(|| format!("upsert fixture {}", row.fixture_id))?;
    }
    tx.commit().context("commit fixture transaction")?;
    Ok(rows.len())
}

pub fn upsert_statistics(conn: &mut Connection, rows: &[StatisticsRow]) -> Result<usize> {
    let tx = conn.transaction().context("begin statistics transaction")?;
    let now = Utc::now().to_rfc3339();
    for row in rows {
        tx.execute(
            r#"
            INSERT INTO match_statistics (
                fixture_id,
                home_shots, away_shots,
                home_shots_on_target, away_shots_on_target,
                home_possession, away_possession,
                home_corners, away_corners,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(fixture_id) DO UPDATE SET
                home_shots = excluded.home_shots,
                away_shots = excluded.away_shots,
                home_shots_on_target = excluded.home_shots_on_target,
                away_shots_on_target = excluded.away_shots_on_target,
                home_possession = excluded.home_possession,
                away_possession = excluded.away_possession,
                home_corners = excluded.home_corners,
                away_corners = excluded.away_corners,
                updated_at = excluded.updated_at
            "#,
            params![
                row.fixture_id,
                row.home.shots,
                row.away.shots,
                row.home.shots_on_target,
                row.away.shots_on_target,
                row.home.possession,
                row.away.possession,
                row.home.corners,
                row.away.corners,
                now,
            ],
        )
        .with_context(|| format!("upsert statistics for fixture {}", row.fixture_id))?;
    }
    tx.commit().context("commit statistics transaction")?;
    Ok(rows.len())
}

/// Every fixture of the league with its statistics if present, oldest first.
/// Validation happens later in [`crate::ingest::normalize_matches`].
pub fn load_raw_matches(conn: &Connection, league_id: u32) -> Result<Vec<RawMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                f.fixture_id, f.kickoff, f.season,
                f.home_team_id, f.away_team_id,
                f.home_goals, f.away_goals, f.result,
                s.fixture_id,
                s.home_shots, s.home_shots_on_target, s.home_possession, s.home_corners,
                s.away_shots, s.away_shots_on_target, s.away_possession, s.away_corners
            FROM fixtures f
            LEFT JOIN match_statistics s ON s.fixture_id = f.fixture_id
            WHERE f.league_id = ?1
            ORDER BY f.kickoff ASC, f.fixture_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(params![league_id as i64], |row| {
            let has_stats = row.get::<_, Option<i64>>(8)?.is_some();
            let (home_stats, away_stats) = if has_stats {
                (
                    Some(RawStatLine {
                        shots: row.get(9)?,
                        shots_on_target: row.get(10)?,
                        possession: row.get(11)?,
                        corners: row.get(12)?,
                    }),
                    Some(RawStatLine {
                        shots: row.get(13)?,
                        shots_on_target: row.get(14)?,
                        possession: row.get(15)?,
                        corners: row.get(16)?,
                    }),
                )
            } else {
                (None, None)
            };
            Ok(RawMatch {
                fixture_id: row.get(0)?,
                kickoff: row.get(1)?,
                season: row.get(2)?,
                home_team_id: row.get(3)?,
                away_team_id: row.get(4)?,
                home_goals: row.get(5)?,
                away_goals: row.get(6)?,
                result: row.get(7)?,
                home_stats,
                away_stats,
            })
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

/// Completed fixtures that have no statistics row yet.
pub fn fixtures_missing_statistics(
    conn: &Connection,
    league_id: u32,
    season: Option<u16>,
) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT f.fixture_id
            FROM fixtures f
            LEFT JOIN match_statistics s ON s.fixture_id = f.fixture_id
            WHERE f.league_id = ?1
              AND (?2 IS NULL OR f.season = ?2)
              AND f.result IS NOT NULL
              AND s.fixture_id IS NULL
            ORDER BY f.kickoff ASC
            "#,
        )
        .context("prepare missing statistics query")?;
    let rows = stmt
        .query_map(params![league_id as i64, season.map(i64::from)], |row| {
            row.get::<_, i64>(0)
        })
        .context("query missing statistics")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture id")?);
    }
    Ok(out)
}

/// Unplayed fixtures kicking off in `[from, to)`.
pub fn load_upcoming_fixtures(
    conn: &Connection,
    league_id: u32,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Fixture>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT fixture_id, league_id, season, kickoff,
                   home_team_id, away_team_id, home_team, away_team,
                   home_goals, away_goals, result, venue, status
            FROM fixtures
            WHERE league_id = ?1
              AND result IS NULL
              AND kickoff >= ?2
              AND kickoff < ?3
            ORDER BY kickoff ASC, fixture_id ASC
            "#,
        )
        .context("prepare upcoming fixtures query")?;
    let rows = stmt
        .query_map(
            params![league_id as i64, from.timestamp(), to.timestamp()],
            fixture_row,
        )
        .context("query upcoming fixtures")?;

    let mut out = Vec::new();
    for row in rows {
        let row = row.context("decode fixture row")?;
        match row.to_fixture() {
            Some(fixture) => out.push(fixture),
            None => log::warn!("skipping fixture {}: invalid ids or kickoff", row.fixture_id),
        }
    }
    Ok(out)
}

pub fn load_fixture(conn: &Connection, fixture_id: i64) -> Result<Option<FixtureRow>> {
    conn.query_row(
        r#"
        SELECT fixture_id, league_id, season, kickoff,
               home_team_id, away_team_id, home_team, away_team,
               home_goals, away_goals, result, venue, status
        FROM fixtures
        WHERE fixture_id = ?1
        "#,
        params![fixture_id],
        fixture_row,
    )
    .optional()
    .with_context(|| format!("load fixture {fixture_id}"))
}

fn fixture_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FixtureRow> {
    Ok(FixtureRow {
        fixture_id: row.get(0)?,
        league_id: row.get::<_, u32>(1)?,
        season: row.get(2)?,
        kickoff: row.get(3)?,
        home_team_id: row.get(4)?,
        away_team_id: row.get(5)?,
        home_team: row.get(6)?,
        away_team: row.get(7)?,
        home_goals: row.get(8)?,
        away_goals: row.get(9)?,
        result: row.get(10)?,
        venue: row.get(11)?,
        status: row.get(12)?,
    })
}

/// One prediction per fixture per day; a rerun on the same day replaces it.
pub fn save_prediction(
    conn: &Connection,
    prediction: &Prediction,
    prediction_date: NaiveDate,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO predictions (
            fixture_id, prediction_date,
            home_win_prob, draw_prob, away_win_prob,
            predicted_result, confidence, model_version, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(fixture_id, prediction_date) DO UPDATE SET
            home_win_prob = excluded.home_win_prob,
            draw_prob = excluded.draw_prob,
            away_win_prob = excluded.away_win_prob,
            predicted_result = excluded.predicted_result,
            confidence = excluded.confidence,
            model_version = excluded.model_version,
            created_at = excluded.created_at
        "#,
        params![
            prediction.fixture_id.0 as i64,
            prediction_date.to_string(),
            prediction.probs.home,
            prediction.probs.draw,
            prediction.probs.away,
            prediction.predicted.code().to_string(),
            prediction.confidence.as_str(),
            prediction.model_version,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("save prediction for fixture {}", prediction.fixture_id))?;
    Ok(())
}

/// Latest prediction of every fixture that kicked off before `now` and has
/// not been scored yet, oldest kickoff first. Cancelled, abandoned and
/// awarded fixtures are left out.
pub fn load_untracked_predictions(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<PendingPrediction>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT p.fixture_id, p.predicted_result, p.confidence,
                   p.home_win_prob, p.draw_prob, p.away_win_prob
            FROM predictions p
            JOIN fixtures f ON f.fixture_id = p.fixture_id
            LEFT JOIN prediction_accuracy pa ON pa.fixture_id = p.fixture_id
            WHERE f.kickoff < ?1
              AND pa.fixture_id IS NULL
              AND f.status NOT IN ('CANC', 'ABD', 'AWD', 'WO')
              AND p.prediction_date = (
                  SELECT MAX(p2.prediction_date) FROM predictions p2
                  WHERE p2.fixture_id = p.fixture_id
              )
            ORDER BY f.kickoff ASC, p.fixture_id ASC
            LIMIT ?2
            "#,
        )
        .context("prepare untracked predictions query")?;
    let rows = stmt
        .query_map(params![now.timestamp(), limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                Prob3 {
                    home: row.get(3)?,
                    draw: row.get(4)?,
                    away: row.get(5)?,
                },
            ))
        })
        .context("query untracked predictions")?;

    let mut out = Vec::new();
    for row in rows {
        let (fixture_id, predicted, confidence, probs) =
            row.context("decode prediction row")?;
        let (Some(predicted), Some(confidence)) =
            (Outcome::from_code(&predicted), Confidence::parse(&confidence))
        else {
            log::warn!("skipping prediction for fixture {fixture_id}: unreadable label");
            continue;
        };
        out.push(PendingPrediction {
            fixture_id: FixtureId(fixture_id as u64),
            predicted,
            probs,
            confidence,
        });
    }
    Ok(out)
}

/// Returns false when the fixture was already scored.
pub fn save_accuracy(conn: &Connection, record: &AccuracyRecord) -> Result<bool> {
    let inserted = conn
        .execute(
            r#"
            INSERT INTO prediction_accuracy (
                fixture_id, predicted_result, actual_result, was_correct,
                predicted_home_prob, predicted_draw_prob, predicted_away_prob,
                confidence, brier, tracked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(fixture_id) DO NOTHING
            "#,
            params![
                record.fixture_id.0 as i64,
                record.predicted.code().to_string(),
                record.actual.code().to_string(),
                record.correct,
                record.probs.home,
                record.probs.draw,
                record.probs.away,
                record.confidence.as_str(),
                record.brier,
                record.checked_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("save accuracy for fixture {}", record.fixture_id))?;
    Ok(inserted > 0)
}

pub fn load_accuracy_records(conn: &Connection) -> Result<Vec<AccuracyRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT fixture_id, predicted_result, actual_result, was_correct,
                   predicted_home_prob, predicted_draw_prob, predicted_away_prob,
                   confidence, brier, tracked_at
            FROM prediction_accuracy
            ORDER BY tracked_at ASC, fixture_id ASC
            "#,
        )
        .context("prepare accuracy query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                Prob3 {
                    home: row.get(4)?,
                    draw: row.get(5)?,
                    away: row.get(6)?,
                },
                row.get::<_, String>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
            ))
        })
        .context("query accuracy records")?;

    let mut out = Vec::new();
    for row in rows {
        let (fixture_id, predicted, actual, correct, probs, confidence, brier, tracked_at) =
            row.context("decode accuracy row")?;
        let parsed = (
            Outcome::from_code(&predicted),
            Outcome::from_code(&actual),
            Confidence::parse(&confidence),
            DateTime::parse_from_rfc3339(&tracked_at).ok(),
        );
        let (Some(predicted), Some(actual), Some(confidence), Some(checked_at)) = parsed else {
            log::warn!("skipping accuracy row for fixture {fixture_id}: unreadable columns");
            continue;
        };
        out.push(AccuracyRecord {
            fixture_id: FixtureId(fixture_id as u64),
            predicted,
            actual,
            correct,
            confidence,
            probs,
            prob_actual: probs.get(actual),
            brier,
            checked_at: checked_at.with_timezone(&Utc),
        });
    }
    Ok(out)
}

pub fn begin_ingest_run(conn: &Connection, league_id: u32, season: u16) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, league_id, season, fixtures_upserted, statistics_upserted, errors_json)
         VALUES (?1, NULL, ?2, ?3, 0, 0, '[]')",
        params![Utc::now().to_rfc3339(), league_id as i64, i64::from(season)],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_ingest_run(conn: &Connection, run_id: i64, stats: &IngestRunStats) -> Result<()> {
    let errors_json = serde_json::to_string(&stats.errors).context("serialize ingest errors")?;
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, fixtures_upserted = ?2, statistics_upserted = ?3, errors_json = ?4
         WHERE run_id = ?5",
        params![
            Utc::now().to_rfc3339(),
            stats.fixtures_upserted as i64,
            stats.statistics_upserted as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;
    Ok(())
}
