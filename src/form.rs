//! Rolling form: a team's recent statistics as of a cutoff.
//!
//! Only matches that kicked off strictly before the cutoff are considered. A
//! window shorter than the requested lookback yields `None` so callers can tell
//! "not enough history" apart from a computed snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::ingest::StatsPolicy;
use crate::model::{Match, Outcome, Role, TeamId, VenueFilter};

pub const DEFAULT_LOOKBACK: usize = 5;

/// Number of most recent matches a snapshot is built from. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Lookback(usize);

impl Lookback {
    pub fn new(matches: usize) -> EngineResult<Self> {
        if matches == 0 {
            return Err(EngineError::InvalidLookback(matches));
        }
        Ok(Self(matches))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self(DEFAULT_LOOKBACK)
    }
}

impl TryFrom<usize> for Lookback {
    type Error = EngineError;

    fn try_from(value: usize) -> EngineResult<Self> {
        Lookback::new(value)
    }
}

impl From<Lookback> for usize {
    fn from(value: Lookback) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSnapshot {
    pub team: TeamId,
    pub cutoff: DateTime<Utc>,
    pub lookback: Lookback,
    pub venue: VenueFilter,

    pub games: usize,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    /// Per-game goals, oldest first.
    pub goals_for: Vec<u16>,
    pub goals_against: Vec<u16>,
    pub shots_for: u32,
    pub shots_against: u32,
    pub shots_on_target_for: u32,
    pub corners_for: u32,
    /// Possession of the matches that reported it, oldest first.
    pub possession_samples: Vec<f64>,

    pub win_fraction: f64,
    pub avg_goals_for: f64,
    pub avg_goals_against: f64,
    pub avg_shots_for: f64,
    pub avg_possession: f64,
    pub avg_corners_for: f64,
    pub goal_difference: i32,
    /// Shots on target per shot, in percent.
    pub shot_accuracy: f64,
    /// Goals per shot on target, in percent.
    pub conversion_rate: f64,
    /// Goals conceded per shot faced. Lower is better.
    pub defensive_efficiency: f64,
    pub points: u32,
}

/// Anything that can answer form queries over a read-only match history.
pub trait FormSource {
    fn form(
        &self,
        team: TeamId,
        cutoff: DateTime<Utc>,
        lookback: Lookback,
        venue: VenueFilter,
        policy: &StatsPolicy,
    ) -> Option<FormSnapshot>;
}

impl FormSource for [Match] {
    fn form(
        &self,
        team: TeamId,
        cutoff: DateTime<Utc>,
        lookback: Lookback,
        venue: VenueFilter,
        policy: &StatsPolicy,
    ) -> Option<FormSnapshot> {
        compute_form(self, team, cutoff, lookback, venue, policy)
    }
}

/// Scans the whole collection; it does not need to be sorted.
pub fn compute_form(
    matches: &[Match],
    team: TeamId,
    cutoff: DateTime<Utc>,
    lookback: Lookback,
    venue: VenueFilter,
    policy: &StatsPolicy,
) -> Option<FormSnapshot> {
    let mut eligible: Vec<(&Match, Role)> = matches
        .iter()
        .filter(|m| m.kickoff < cutoff)
        .filter_map(|m| m.role_of(team).map(|role| (m, role)))
        .filter(|(_, role)| venue.admits(*role))
        .collect();

    let n = lookback.get();
    if eligible.len() < n {
        return None;
    }
    eligible.sort_by(|(a, _), (b, _)| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
    let window = &eligible[eligible.len() - n..];
    Some(summarize(team, cutoff, lookback, venue, window, policy))
}

/// Per-team chronological index, built once per batch and shared read-only.
pub struct MatchIndex<'a> {
    by_team: HashMap<TeamId, Vec<(&'a Match, Role)>>,
}

impl<'a> MatchIndex<'a> {
    pub fn new(matches: &'a [Match]) -> Self {
        let mut by_team: HashMap<TeamId, Vec<(&'a Match, Role)>> = HashMap::new();
        for m in matches {
            by_team.entry(m.home_team).or_default().push((m, Role::Home));
            by_team.entry(m.away_team).or_default().push((m, Role::Away));
        }
        for entries in by_team.values_mut() {
            entries.sort_by(|(a, _), (b, _)| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
        }
        Self { by_team }
    }

    pub fn team_count(&self) -> usize {
        self.by_team.len()
    }
}

impl FormSource for MatchIndex<'_> {
    fn form(
        &self,
        team: TeamId,
        cutoff: DateTime<Utc>,
        lookback: Lookback,
        venue: VenueFilter,
        policy: &StatsPolicy,
    ) -> Option<FormSnapshot> {
        let entries = self.by_team.get(&team)?;
        let before = entries.partition_point(|(m, _)| m.kickoff < cutoff);
        let n = lookback.get();

        let mut window: Vec<(&Match, Role)> = entries[..before]
            .iter()
            .rev()
            .filter(|(_, role)| venue.admits(*role))
            .take(n)
            .copied()
            .collect();
        if window.len() < n {
            return None;
        }
        window.reverse();
        Some(summarize(team, cutoff, lookback, venue, &window, policy))
    }
}

fn summarize(
    team: TeamId,
    cutoff: DateTime<Utc>,
    lookback: Lookback,
    venue: VenueFilter,
    window: &[(&Match, Role)],
    policy: &StatsPolicy,
) -> FormSnapshot {
    let mut wins = 0u32;
    let mut draws = 0u32;
    let mut losses = 0u32;
    let mut goals_for = Vec::with_capacity(window.len());
    let mut goals_against = Vec::with_capacity(window.len());
    let mut shots_for = 0u32;
    let mut shots_against = 0u32;
    let mut shots_on_target_for = 0u32;
    let mut corners_for = 0u32;
    let mut possession_samples = Vec::new();

    for (m, role) in window {
        let own = m.stats(*role);
        let other = m.stats(role.opposite());

        goals_for.push(m.goals(*role));
        goals_against.push(m.goals(role.opposite()));
        shots_for = shots_for.saturating_add(own.shots);
        shots_against = shots_against.saturating_add(other.shots);
        shots_on_target_for = shots_on_target_for.saturating_add(own.shots_on_target);
        corners_for = corners_for.saturating_add(own.corners);
        if let Some(p) = own.possession {
            possession_samples.push(p);
        }

        let outcome = m.outcome();
        if outcome == role.winning_outcome() {
            wins += 1;
        } else if outcome == Outcome::Draw {
            draws += 1;
        } else {
            losses += 1;
        }
    }

    let games = window.len();
    let n = games as f64;
    let total_for: u32 = goals_for.iter().map(|g| u32::from(*g)).sum();
    let total_against: u32 = goals_against.iter().map(|g| u32::from(*g)).sum();

    let avg_possession = if possession_samples.is_empty() {
        policy.missing_possession
    } else {
        possession_samples.iter().sum::<f64>() / possession_samples.len() as f64
    };

    FormSnapshot {
        team,
        cutoff,
        lookback,
        venue,
        games,
        wins,
        draws,
        losses,
        win_fraction: f64::from(wins) / lookback.get() as f64,
        avg_goals_for: f64::from(total_for) / n,
        avg_goals_against: f64::from(total_against) / n,
        avg_shots_for: f64::from(shots_for) / n,
        avg_possession,
        avg_corners_for: f64::from(corners_for) / n,
        goal_difference: total_for as i32 - total_against as i32,
        shot_accuracy: percent(shots_on_target_for, shots_for),
        conversion_rate: percent(total_for, shots_on_target_for),
        defensive_efficiency: if shots_against > 0 {
            f64::from(total_against) / f64::from(shots_against)
        } else {
            0.0
        },
        points: wins * 3 + draws,
        goals_for,
        goals_against,
        shots_for,
        shots_against,
        shots_on_target_for,
        corners_for,
        possession_samples,
    }
}

fn percent(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    100.0 * f64::from(numerator) / f64::from(denominator)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{FormSource, Lookback, MatchIndex, compute_form};
    use crate::error::EngineError;
    use crate::ingest::StatsPolicy;
    use crate::model::{FixtureId, Match, StatLine, TeamId, VenueFilter};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 15, 0, 0).single().expect("valid date") + Duration::days(n)
    }

    fn game(id: u64, d: i64, home: u32, away: u32, hg: u16, ag: u16) -> Match {
        Match {
            id: FixtureId(id),
            kickoff: day(d),
            season: Some(2024),
            home_team: TeamId(home),
            away_team: TeamId(away),
            home_goals: hg,
            away_goals: ag,
            home_stats: StatLine {
                shots: 10,
                shots_on_target: 4,
                corners: 5,
                possession: Some(55.0),
                enriched: true,
            },
            away_stats: StatLine {
                shots: 8,
                shots_on_target: 2,
                corners: 3,
                possession: Some(45.0),
                enriched: true,
            },
        }
    }

    #[test]
    fn lookback_must_be_positive() {
        assert_eq!(Lookback::new(0), Err(EngineError::InvalidLookback(0)));
        assert_eq!(Lookback::default().get(), 5);
    }

    #[test]
    fn window_takes_most_recent_matches_before_cutoff() {
        let matches = vec![
            game(1, 0, 1, 2, 0, 1),
            game(2, 7, 3, 1, 0, 0),
            game(3, 14, 1, 4, 3, 1),
            game(4, 21, 1, 5, 2, 2),
            // on the cutoff day: excluded
            game(5, 28, 6, 1, 0, 4),
        ];
        let lookback = Lookback::new(3).expect("positive");
        let snap = compute_form(
            &matches,
            TeamId(1),
            day(28),
            lookback,
            VenueFilter::Any,
            &StatsPolicy::default(),
        )
        .expect("enough history");
        assert_eq!(snap.goals_for, vec![0, 3, 2]);
        assert_eq!(snap.goals_against, vec![0, 1, 2]);
        assert_eq!((snap.wins, snap.draws, snap.losses), (1, 2, 0));
        assert_eq!(snap.points, 5);
    }

    #[test]
    fn venue_filter_restricts_role() {
        let matches = vec![
            game(1, 0, 1, 2, 1, 0),
            game(2, 7, 3, 1, 2, 0),
            game(3, 14, 1, 4, 1, 1),
        ];
        let one = Lookback::new(1).expect("positive");
        let policy = StatsPolicy::default();
        let away = compute_form(&matches, TeamId(1), day(30), one, VenueFilter::AwayOnly, &policy)
            .expect("one away game");
        assert_eq!(away.losses, 1);
        assert_eq!(away.shots_for, 8);
        assert_eq!(away.shots_against, 10);

        let two = Lookback::new(2).expect("positive");
        assert!(
            compute_form(&matches, TeamId(1), day(30), two, VenueFilter::AwayOnly, &policy)
                .is_none()
        );
    }

    #[test]
    fn missing_possession_falls_back_to_policy_value() {
        let mut m = game(1, 0, 1, 2, 1, 0);
        m.home_stats = StatLine::default();
        let one = Lookback::new(1).expect("positive");
        let policy = StatsPolicy {
            missing_possession: 50.0,
        };
        let snap = compute_form(&[m], TeamId(1), day(1), one, VenueFilter::Any, &policy)
            .expect("one game");
        assert!(snap.possession_samples.is_empty());
        assert_eq!(snap.avg_possession, 50.0);
        assert_eq!(snap.shot_accuracy, 0.0);
        assert_eq!(snap.conversion_rate, 0.0);
    }

    #[test]
    fn mixed_possession_averages_only_present_samples() {
        let matches: Vec<Match> = (0..5)
            .map(|i| {
                let mut m = game(i + 1, i as i64, 1, 2, 1, 1);
                m.home_stats.possession = if i == 0 { Some(60.0) } else { None };
                m
            })
            .collect();
        let snap = compute_form(
            &matches,
            TeamId(1),
            day(10),
            Lookback::default(),
            VenueFilter::Any,
            &StatsPolicy::default(),
        )
        .expect("five games");
        assert_eq!(snap.possession_samples, vec![60.0]);
        assert_eq!(snap.avg_possession, 60.0);
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let matches: Vec<Match> = (0..2)
            .map(|i| {
                let mut m = game(i + 1, i as i64, 1, 2, 1, 0);
                m.home_stats.shots = u32::MAX;
                m.home_stats.corners = u32::MAX;
                m.away_stats.shots = u32::MAX;
                m
            })
            .collect();
        let two = Lookback::new(2).expect("positive");
        let snap = compute_form(
            &matches,
            TeamId(1),
            day(5),
            two,
            VenueFilter::Any,
            &StatsPolicy::default(),
        )
        .expect("two games");
        assert_eq!(snap.shots_for, u32::MAX);
        assert_eq!(snap.shots_against, u32::MAX);
        assert_eq!(snap.corners_for, u32::MAX);
        assert!(snap.shot_accuracy.is_finite());
        assert!(snap.defensive_efficiency.is_finite());
    }

    #[test]
    fn index_matches_direct_scan() {
        let mut matches = Vec::new();
        let mut id = 1;
        for d in 0..40 {
            let home = (d % 4 + 1) as u32;
            let away = ((d + 1) % 4 + 1) as u32;
            matches.push(game(id, d, home, away, (d % 3) as u16, (d % 2) as u16));
            id += 1;
        }
        // Same kickoff as another match: ordering falls back to fixture id.
        matches.push(game(id, 20, 2, 3, 4, 0));

        let index = MatchIndex::new(&matches);
        let policy = StatsPolicy::default();
        let lookback = Lookback::default();
        for team in 1..=4 {
            for cutoff in [5, 19, 20, 21, 39, 60] {
                for venue in [VenueFilter::Any, VenueFilter::HomeOnly, VenueFilter::AwayOnly] {
                    let direct = matches
                        .as_slice()
                        .form(TeamId(team), day(cutoff), lookback, venue, &policy);
                    let indexed = index.form(TeamId(team), day(cutoff), lookback, venue, &policy);
                    assert_eq!(direct, indexed, "team {team} cutoff {cutoff} {venue:?}");
                }
            }
        }
    }
}
