//! API-Football v3 client and payload parsers.
//!
//! Parsers work on raw JSON text so they can be exercised without the network.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::http_cache::{CachePolicy, fetch_json_cached, forget};
use crate::ingest::RawStatLine;
use crate::model::Outcome;
use crate::store::{FixtureRow, StatisticsRow};

pub const DEFAULT_API_BASE: &str = "https://v3.football.api-sports.io";
pub const COMPLETED_STATUSES: [&str; 3] = ["FT", "AET", "PEN"];
/// Terminal statuses that never carry a final score.
pub const VOID_STATUSES: [&str; 4] = ["CANC", "ABD", "AWD", "WO"];
const API_KEY_HEADER: &str = "x-apisports-key";

const SEASON_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const UPCOMING_TTL: Duration = Duration::from_secs(60 * 60);
// Statistics of a finished match do not change.
const STATISTICS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub fn is_completed_status(status: &str) -> bool {
    COMPLETED_STATUSES.contains(&status)
}

pub fn is_void_status(status: &str) -> bool {
    VOID_STATUSES.contains(&status)
}

pub struct ApiFootball {
    client: &'static Client,
    base: String,
    api_key: String,
    request_delay: Duration,
    last_request: Cell<Option<Instant>>,
}

impl ApiFootball {
    pub fn new(
        client: &'static Client,
        base: impl Into<String>,
        api_key: impl Into<String>,
        request_delay: Duration,
    ) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_delay,
            last_request: Cell::new(None),
        }
    }

    /// Every fixture of a league season, played or not.
    pub fn season_fixtures(&self, league_id: u32, season: u16) -> Result<Vec<FixtureRow>> {
        let url = format!("{}/fixtures?league={league_id}&season={season}", self.base);
        let body = self.get(&url, CachePolicy::FreshFor(SEASON_TTL))?;
        parse_fixtures_json(&body, league_id)
            .with_context(|| format!("league {league_id} season {season} fixtures"))
    }

    pub fn upcoming_fixtures(
        &self,
        league_id: u32,
        season: u16,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FixtureRow>> {
        let url = format!(
            "{}/fixtures?league={league_id}&season={season}&from={}&to={}",
            self.base,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let body = self.get(&url, CachePolicy::FreshFor(UPCOMING_TTL))?;
        parse_fixtures_json(&body, league_id).context("upcoming fixtures")
    }

    /// Current state of a single fixture; `None` when the API does not know it.
    pub fn fixture(&self, league_id: u32, fixture_id: i64) -> Result<Option<FixtureRow>> {
        let url = format!("{}/fixtures?id={fixture_id}", self.base);
        let body = self.get(&url, CachePolicy::Revalidate)?;
        let rows = parse_fixtures_json(&body, league_id)
            .with_context(|| format!("fixture {fixture_id}"))?;
        Ok(rows.into_iter().find(|r| r.fixture_id == fixture_id))
    }

    pub fn fixture_statistics(
        &self,
        fixture_id: i64,
        home_team_id: i64,
    ) -> Result<Option<StatisticsRow>> {
        let url = format!("{}/fixtures/statistics?fixture={fixture_id}", self.base);
        let body = self.get(&url, CachePolicy::FreshFor(STATISTICS_TTL))?;
        let parsed = parse_statistics_json(&body, fixture_id, home_team_id);
        if matches!(parsed, Ok(None)) {
            // Statistics can appear later; do not pin the empty answer.
            forget(&url);
        }
        parsed.with_context(|| format!("statistics for fixture {fixture_id}"))
    }

    fn get(&self, url: &str, policy: CachePolicy) -> Result<String> {
        self.throttle();
        let headers = [(API_KEY_HEADER, self.api_key.as_str())];
        let body = fetch_json_cached(self.client, url, &headers, policy)?;
        if let Err(err) = check_api_errors(&body) {
            forget(url);
            return Err(err);
        }
        Ok(body)
    }

    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                thread::sleep(self.request_delay - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}

/// API-Football reports quota and auth problems with status 200 and a
/// non-empty `errors` list or object.
fn check_api_errors(body: &str) -> Result<()> {
    let value: Value = serde_json::from_str(body.trim()).context("invalid api-football json")?;
    let errors = match value.get("errors") {
        Some(Value::Array(items)) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Some(Value::Object(map)) if !map.is_empty() => Some(
            map.iter()
                .map(|(k, v)| match v.as_str() {
                    Some(text) => format!("{k}: {text}"),
                    None => format!("{k}: {v}"),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    };
    match errors {
        Some(msg) => Err(anyhow!("api-football error: {msg}")),
        None => Ok(()),
    }
}

fn response_items(body: &str) -> Result<Vec<Value>> {
    check_api_errors(body)?;
    let value: Value = serde_json::from_str(body.trim()).context("invalid api-football json")?;
    match value.get("response") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(anyhow!("missing response array")),
    }
}

/// Fixtures payload to store rows. Entries missing ids, teams or a kickoff are
/// skipped with a warning. Scores are only kept for completed fixtures so an
/// in-play score is never mistaken for a result.
pub fn parse_fixtures_json(body: &str, league_id: u32) -> Result<Vec<FixtureRow>> {
    let items = response_items(body)?;
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        match parse_fixture(item, league_id) {
            Some(row) => out.push(row),
            None => log::warn!("skipping unparseable fixture entry: {}", short(item)),
        }
    }
    Ok(out)
}

fn parse_fixture(v: &Value, fallback_league_id: u32) -> Option<FixtureRow> {
    let fixture = v.get("fixture")?;
    let fixture_id = fixture.get("id")?.as_i64()?;
    let kickoff = match fixture.get("timestamp").and_then(Value::as_i64) {
        Some(ts) => ts,
        None => DateTime::parse_from_rfc3339(fixture.get("date")?.as_str()?)
            .ok()?
            .with_timezone(&Utc)
            .timestamp(),
    };
    let status = fixture
        .get("status")
        .and_then(|s| s.get("short"))
        .and_then(Value::as_str)
        .unwrap_or("NS")
        .to_string();
    let venue = fixture
        .get("venue")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let league = v.get("league");
    let league_id = league
        .and_then(|l| l.get("id"))
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(fallback_league_id);
    let season = league.and_then(|l| l.get("season")).and_then(Value::as_i64);

    let teams = v.get("teams")?;
    let home = teams.get("home")?;
    let away = teams.get("away")?;

    let (home_goals, away_goals, result) = if is_completed_status(&status) {
        let goals = v.get("goals");
        let hg = goals.and_then(|g| g.get("home")).and_then(Value::as_i64);
        let ag = goals.and_then(|g| g.get("away")).and_then(Value::as_i64);
        match (hg, ag) {
            (Some(h), Some(a)) if h >= 0 && a >= 0 => {
                let outcome = Outcome::from_goals(h as u16, a as u16);
                (Some(h), Some(a), Some(outcome.code().to_string()))
            }
            _ => (None, None, None),
        }
    } else {
        (None, None, None)
    };

    Some(FixtureRow {
        fixture_id,
        league_id,
        season,
        kickoff,
        home_team_id: home.get("id")?.as_i64()?,
        away_team_id: away.get("id")?.as_i64()?,
        home_team: home.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
        away_team: away.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
        home_goals,
        away_goals,
        result,
        venue,
        status,
    })
}

/// `fixtures/statistics` payload to a statistics row. `Ok(None)` when the API
/// has no statistics for the fixture (fewer than two team entries).
pub fn parse_statistics_json(
    body: &str,
    fixture_id: i64,
    home_team_id: i64,
) -> Result<Option<StatisticsRow>> {
    let items = response_items(body)?;
    if items.len() < 2 {
        return Ok(None);
    }
    let team_id = |v: &Value| v.get("team").and_then(|t| t.get("id")).and_then(Value::as_i64);
    // Entries normally come home first; fall back to that order if ids are missing.
    let (home, away) = if team_id(&items[1]) == Some(home_team_id) {
        (&items[1], &items[0])
    } else {
        (&items[0], &items[1])
    };
    Ok(Some(StatisticsRow {
        fixture_id,
        home: stat_line(home),
        away: stat_line(away),
    }))
}

fn stat_line(team: &Value) -> RawStatLine {
    let stats = team
        .get("statistics")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let find = |name: &str| {
        stats
            .iter()
            .find(|s| s.get("type").and_then(Value::as_str) == Some(name))
            .and_then(|s| s.get("value"))
    };
    RawStatLine {
        shots: find("Total Shots").and_then(stat_number).map(|v| v as i64),
        shots_on_target: find("Shots on Goal").and_then(stat_number).map(|v| v as i64),
        possession: find("Ball Possession").and_then(stat_number),
        corners: find("Corner Kicks").and_then(stat_number).map(|v| v as i64),
    }
}

/// Numbers arrive as integers, as `"55%"` strings, or as null.
fn stat_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn short(v: &Value) -> String {
    let text = v.to_string();
    if text.len() > 120 {
        let cut = (0..=120).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text
    }
}
