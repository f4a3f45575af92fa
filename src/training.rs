//! Batch feature build over the full match history.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::features::{FeatureVector, assemble_features};
use crate::form::{Lookback, MatchIndex};
use crate::ingest::StatsPolicy;
use crate::model::{FixtureId, Match, Outcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingRow {
    pub fixture_id: FixtureId,
    pub kickoff: DateTime<Utc>,
    pub season: Option<u16>,
    pub outcome: Outcome,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub rows: Vec<TrainingRow>,
    /// Matches dropped because a side lacked `lookback` prior matches.
    pub skipped_insufficient: usize,
    /// Matches dropped because fewer than `min_prior_matches` league matches preceded them.
    pub skipped_warmup: usize,
}

impl TrainingSet {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.rows.iter().map(|r| r.outcome).collect()
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.rows.iter().map(|r| r.features).collect()
    }
}

enum RowResult {
    Row(TrainingRow),
    Warmup,
    Insufficient,
}

/// Builds one labelled row per completed match, each from the matches that
/// kicked off strictly before it. Rows come back in kickoff order regardless
/// of how the work is split across threads.
pub fn build_training_set(
    matches: &[Match],
    lookback: Lookback,
    policy: &StatsPolicy,
    min_prior_matches: usize,
) -> TrainingSet {
    let mut ordered: Vec<&Match> = matches.iter().collect();
    ordered.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
    let index = MatchIndex::new(matches);

    let results: Vec<RowResult> = ordered
        .par_iter()
        .map(|m| {
            let prior = ordered.partition_point(|p| p.kickoff < m.kickoff);
            if prior < min_prior_matches {
                return RowResult::Warmup;
            }
            match assemble_features(
                &index,
                m.home_team,
                m.away_team,
                m.kickoff,
                lookback,
                policy,
            ) {
                Some(features) => RowResult::Row(TrainingRow {
                    fixture_id: m.id,
                    kickoff: m.kickoff,
                    season: m.season,
                    outcome: m.outcome(),
                    features,
                }),
                None => RowResult::Insufficient,
            }
        })
        .collect();

    let mut set = TrainingSet::default();
    for result in results {
        match result {
            RowResult::Row(row) => set.rows.push(row),
            RowResult::Warmup => set.skipped_warmup += 1,
            RowResult::Insufficient => set.skipped_insufficient += 1,
        }
    }
    log::info!(
        "built {} training rows ({} without enough team history, {} in warm-up)",
        set.rows.len(),
        set.skipped_insufficient,
        set.skipped_warmup
    );
    set
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::build_training_set;
    use crate::form::Lookback;
    use crate::ingest::StatsPolicy;
    use crate::model::{FixtureId, Match, StatLine, TeamId};

    fn round_robin(rounds: i64) -> Vec<Match> {
        let start = Utc
            .with_ymd_and_hms(2023, 8, 12, 14, 0, 0)
            .single()
            .expect("valid date");
        let mut out = Vec::new();
        let mut id = 100;
        for r in 0..rounds {
            for (home, away) in [(1, 2), (3, 4)] {
                let (h, a) = if r % 2 == 0 { (home, away) } else { (away, home) };
                out.push(Match {
                    id: FixtureId(id),
                    kickoff: start + Duration::days(7 * r),
                    season: Some(2023),
                    home_team: TeamId(h),
                    away_team: TeamId(a),
                    home_goals: (r % 3) as u16,
                    away_goals: (id % 2) as u16,
                    home_stats: StatLine::default(),
                    away_stats: StatLine::default(),
                });
                id += 1;
            }
        }
        out
    }

    #[test]
    fn early_matches_are_skipped_and_rows_stay_ordered() {
        let matches = round_robin(20);
        let lookback = Lookback::new(2).expect("positive");
        let set = build_training_set(&matches, lookback, &StatsPolicy::default(), 4);

        assert_eq!(set.rows.len() + set.skipped_warmup + set.skipped_insufficient, 40);
        // Round 0 and 1 have fewer than four prior matches.
        assert_eq!(set.skipped_warmup, 4);
        assert!(!set.rows.is_empty());
        assert!(
            set.rows
                .windows(2)
                .all(|w| (w[0].kickoff, w[0].fixture_id) < (w[1].kickoff, w[1].fixture_id))
        );
    }
}
