//! Boundary between nullable store rows and the validated [`Match`] model.
//!
//! All null handling happens here: statistic counts become 0, possession stays
//! optional, and rows that break the match invariants are rejected one by one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{FixtureId, Match, Outcome, StatLine, TeamId};

/// Neutral possession share used when a form window carries no possession sample.
pub const DEFAULT_MISSING_POSSESSION: f64 = 50.0;

/// Largest per-team shot or corner count accepted for one match.
pub const MAX_STAT_COUNT: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsPolicy {
    pub missing_possession: f64,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        Self {
            missing_possession: DEFAULT_MISSING_POSSESSION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatLine {
    pub shots: Option<i64>,
    pub shots_on_target: Option<i64>,
    pub possession: Option<f64>,
    pub corners: Option<i64>,
}

/// A match exactly as stored: every column may be null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMatch {
    pub fixture_id: Option<i64>,
    /// Kickoff as unix seconds.
    pub kickoff: Option<i64>,
    pub season: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub home_goals: Option<i64>,
    pub away_goals: Option<i64>,
    pub result: Option<String>,
    /// None when the fixture has no statistics row yet.
    pub home_stats: Option<RawStatLine>,
    pub away_stats: Option<RawStatLine>,
}

impl RawMatch {
    /// `Ok(None)` for fixtures that have not been played yet (no score, no result).
    pub fn into_match(self) -> EngineResult<Option<Match>> {
        let label = self
            .fixture_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<no id>".to_string());
        let malformed = |reason: String| EngineError::MalformedRecord {
            id: label.clone(),
            reason,
        };

        let id = match self.fixture_id {
            Some(id) if id > 0 => FixtureId(id as u64),
            Some(id) => return Err(malformed(format!("non-positive fixture id {id}"))),
            None => return Err(malformed("missing fixture id".to_string())),
        };
        let home_team = team_id(self.home_team_id, "home").map_err(&malformed)?;
        let away_team = team_id(self.away_team_id, "away").map_err(&malformed)?;
        if home_team == away_team {
            return Err(malformed(format!("{home_team} listed on both sides")));
        }

        let kickoff = match self.kickoff {
            Some(ts) if ts >= 0 => DateTime::<Utc>::from_timestamp(ts, 0)
                .ok_or_else(|| malformed(format!("kickoff {ts} out of range")))?,
            Some(ts) => return Err(malformed(format!("negative kickoff timestamp {ts}"))),
            None => return Err(malformed("missing kickoff timestamp".to_string())),
        };

        let stored_result = match self.result.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(code) => Some(
                Outcome::from_code(code)
                    .ok_or_else(|| malformed(format!("unknown result code {code:?}")))?,
            ),
        };

        let (home_goals, away_goals) = match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => (
                goal_count(h).map_err(&malformed)?,
                goal_count(a).map_err(&malformed)?,
            ),
            (None, None) if stored_result.is_none() => return Ok(None),
            _ => return Err(malformed("result without a complete final score".to_string())),
        };

        let derived = Outcome::from_goals(home_goals, away_goals);
        if let Some(stored) = stored_result
            && stored != derived
        {
            return Err(malformed(format!(
                "result {} disagrees with score {home_goals}-{away_goals}",
                stored.code()
            )));
        }

        let season = match self.season {
            Some(s) => Some(
                u16::try_from(s).map_err(|_| malformed(format!("season {s} out of range")))?,
            ),
            None => None,
        };

        Ok(Some(Match {
            id,
            kickoff,
            season,
            home_team,
            away_team,
            home_goals,
            away_goals,
            home_stats: stat_line(self.home_stats.as_ref()).map_err(&malformed)?,
            away_stats: stat_line(self.away_stats.as_ref()).map_err(&malformed)?,
        }))
    }
}

fn team_id(raw: Option<i64>, side: &str) -> Result<TeamId, String> {
    match raw {
        Some(id) if id > 0 && id <= i64::from(u32::MAX) => Ok(TeamId(id as u32)),
        Some(id) => Err(format!("invalid {side} team id {id}")),
        None => Err(format!("missing {side} team id")),
    }
}

fn goal_count(raw: i64) -> Result<u16, String> {
    u16::try_from(raw).map_err(|_| format!("invalid goal count {raw}"))
}

fn count(raw: Option<i64>, name: &str) -> Result<u32, String> {
    match raw {
        None => Ok(0),
        Some(v) => match u32::try_from(v) {
            Ok(n) if n <= MAX_STAT_COUNT => Ok(n),
            _ => Err(format!("invalid {name} count {v}")),
        },
    }
}

fn stat_line(raw: Option<&RawStatLine>) -> Result<StatLine, String> {
    let Some(raw) = raw else {
        return Ok(StatLine::default());
    };
    let possession = match raw.possession {
        Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => Some(p),
        Some(p) => return Err(format!("possession {p} outside 0..=100")),
        None => None,
    };
    let shots = count(raw.shots, "shots")?;
    let shots_on_target = count(raw.shots_on_target, "shots on target")?;
    if raw.shots.is_some() && shots_on_target > shots {
        return Err(format!("{shots_on_target} shots on target out of {shots} shots"));
    }
    Ok(StatLine {
        shots,
        shots_on_target,
        corners: count(raw.corners, "corners")?,
        possession,
        enriched: true,
    })
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Completed matches, ordered by kickoff then fixture id.
    pub matches: Vec<Match>,
    /// Rows skipped because the fixture has not been played.
    pub pending: usize,
    pub rejected: Vec<EngineError>,
}

/// Validates every row; malformed rows are logged and dropped, never fatal.
pub fn normalize_matches(rows: Vec<RawMatch>) -> Normalized {
    let mut out = Normalized::default();
    for row in rows {
        match row.into_match() {
            Ok(Some(m)) => out.matches.push(m),
            Ok(None) => out.pending += 1,
            Err(err) => {
                log::warn!("skipping record: {err}");
                out.rejected.push(err);
            }
        }
    }
    out.matches
        .sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
    out
}
