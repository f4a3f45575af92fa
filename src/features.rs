//! Fixture feature vectors.
//!
//! The field order of [`FeatureVector`] and [`FEATURE_NAMES`] is part of every
//! fitted model: the batch export and the live predictor both go through
//! [`assemble_features`], and model artifacts record the names they were
//! trained against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::form::{FormSnapshot, FormSource, Lookback};
use crate::ingest::StatsPolicy;
use crate::model::{TeamId, VenueFilter};

pub const FEATURE_COUNT: usize = 36;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_win_pct_l5",
    "home_avg_goals_for_l5",
    "home_avg_goals_against_l5",
    "home_avg_shots_for_l5",
    "home_avg_possession_l5",
    "home_win_pct_home_l5",
    "home_avg_goals_for_home_l5",
    "away_win_pct_l5",
    "away_avg_goals_for_l5",
    "away_avg_goals_against_l5",
    "away_avg_shots_for_l5",
    "away_avg_possession_l5",
    "away_win_pct_away_l5",
    "away_avg_goals_for_away_l5",
    "home_shot_accuracy",
    "away_shot_accuracy",
    "shot_accuracy_diff",
    "home_conversion_rate",
    "away_conversion_rate",
    "conversion_diff",
    "home_defensive_efficiency",
    "away_defensive_efficiency",
    "defensive_diff",
    "home_poss_efficiency",
    "away_poss_efficiency",
    "poss_efficiency_diff",
    "home_corner_effectiveness",
    "away_corner_effectiveness",
    "form_diff",
    "goal_diff_comparison",
    "points_diff",
    "home_advantage",
    "home_attack_vs_away_defense",
    "away_attack_vs_home_defense",
    "home_recent_points",
    "away_recent_points",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // Team form
    pub home_win_pct_l5: f64,
    pub home_avg_goals_for_l5: f64,
    pub home_avg_goals_against_l5: f64,
    pub home_avg_shots_for_l5: f64,
    pub home_avg_possession_l5: f64,
    pub home_win_pct_home_l5: f64,
    pub home_avg_goals_for_home_l5: f64,
    pub away_win_pct_l5: f64,
    pub away_avg_goals_for_l5: f64,
    pub away_avg_goals_against_l5: f64,
    pub away_avg_shots_for_l5: f64,
    pub away_avg_possession_l5: f64,
    pub away_win_pct_away_l5: f64,
    pub away_avg_goals_for_away_l5: f64,
    // Efficiency
    pub home_shot_accuracy: f64,
    pub away_shot_accuracy: f64,
    pub shot_accuracy_diff: f64,
    pub home_conversion_rate: f64,
    pub away_conversion_rate: f64,
    pub conversion_diff: f64,
    pub home_defensive_efficiency: f64,
    pub away_defensive_efficiency: f64,
    pub defensive_diff: f64,
    pub home_poss_efficiency: f64,
    pub away_poss_efficiency: f64,
    pub poss_efficiency_diff: f64,
    pub home_corner_effectiveness: f64,
    pub away_corner_effectiveness: f64,
    // Match context
    pub form_diff: f64,
    pub goal_diff_comparison: f64,
    pub points_diff: f64,
    pub home_advantage: f64,
    pub home_attack_vs_away_defense: f64,
    pub away_attack_vs_home_defense: f64,
    pub home_recent_points: f64,
    pub away_recent_points: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.home_win_pct_l5,
            self.home_avg_goals_for_l5,
            self.home_avg_goals_against_l5,
            self.home_avg_shots_for_l5,
            self.home_avg_possession_l5,
            self.home_win_pct_home_l5,
            self.home_avg_goals_for_home_l5,
            self.away_win_pct_l5,
            self.away_avg_goals_for_l5,
            self.away_avg_goals_against_l5,
            self.away_avg_shots_for_l5,
            self.away_avg_possession_l5,
            self.away_win_pct_away_l5,
            self.away_avg_goals_for_away_l5,
            self.home_shot_accuracy,
            self.away_shot_accuracy,
            self.shot_accuracy_diff,
            self.home_conversion_rate,
            self.away_conversion_rate,
            self.conversion_diff,
            self.home_defensive_efficiency,
            self.away_defensive_efficiency,
            self.defensive_diff,
            self.home_poss_efficiency,
            self.away_poss_efficiency,
            self.poss_efficiency_diff,
            self.home_corner_effectiveness,
            self.away_corner_effectiveness,
            self.form_diff,
            self.goal_diff_comparison,
            self.points_diff,
            self.home_advantage,
            self.home_attack_vs_away_defense,
            self.away_attack_vs_home_defense,
            self.home_recent_points,
            self.away_recent_points,
        ]
    }

    /// Inverse of [`FeatureVector::to_array`].
    pub fn from_array(v: [f64; FEATURE_COUNT]) -> Self {
        Self {
            home_win_pct_l5: v[0],
            home_avg_goals_for_l5: v[1],
            home_avg_goals_against_l5: v[2],
            home_avg_shots_for_l5: v[3],
            home_avg_possession_l5: v[4],
            home_win_pct_home_l5: v[5],
            home_avg_goals_for_home_l5: v[6],
            away_win_pct_l5: v[7],
            away_avg_goals_for_l5: v[8],
            away_avg_goals_against_l5: v[9],
            away_avg_shots_for_l5: v[10],
            away_avg_possession_l5: v[11],
            away_win_pct_away_l5: v[12],
            away_avg_goals_for_away_l5: v[13],
            home_shot_accuracy: v[14],
            away_shot_accuracy: v[15],
            shot_accuracy_diff: v[16],
            home_conversion_rate: v[17],
            away_conversion_rate: v[18],
            conversion_diff: v[19],
            home_defensive_efficiency: v[20],
            away_defensive_efficiency: v[21],
            defensive_diff: v[22],
            home_poss_efficiency: v[23],
            away_poss_efficiency: v[24],
            poss_efficiency_diff: v[25],
            home_corner_effectiveness: v[26],
            away_corner_effectiveness: v[27],
            form_diff: v[28],
            goal_diff_comparison: v[29],
            points_diff: v[30],
            home_advantage: v[31],
            home_attack_vs_away_defense: v[32],
            away_attack_vs_home_defense: v[33],
            home_recent_points: v[34],
            away_recent_points: v[35],
        }
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.to_array())
    }
}

/// The four snapshots a fixture needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureForm {
    pub home: FormSnapshot,
    pub home_at_home: FormSnapshot,
    pub away: FormSnapshot,
    pub away_on_road: FormSnapshot,
}

pub fn collect_form<S>(
    source: &S,
    home: TeamId,
    away: TeamId,
    cutoff: DateTime<Utc>,
    lookback: Lookback,
    policy: &StatsPolicy,
) -> Option<FixtureForm>
where
    S: FormSource + ?Sized,
{
    Some(FixtureForm {
        home: source.form(home, cutoff, lookback, VenueFilter::Any, policy)?,
        home_at_home: source.form(home, cutoff, lookback, VenueFilter::HomeOnly, policy)?,
        away: source.form(away, cutoff, lookback, VenueFilter::Any, policy)?,
        away_on_road: source.form(away, cutoff, lookback, VenueFilter::AwayOnly, policy)?,
    })
}

/// `None` when either side lacks `lookback` prior matches overall or at the relevant venue.
pub fn assemble_features<S>(
    source: &S,
    home: TeamId,
    away: TeamId,
    cutoff: DateTime<Utc>,
    lookback: Lookback,
    policy: &StatsPolicy,
) -> Option<FeatureVector>
where
    S: FormSource + ?Sized,
{
    collect_form(source, home, away, cutoff, lookback, policy).map(|form| combine(&form))
}

pub fn combine(form: &FixtureForm) -> FeatureVector {
    let h = &form.home;
    let a = &form.away;

    let home_poss_efficiency = ratio(h.avg_goals_for, h.avg_possession);
    let away_poss_efficiency = ratio(a.avg_goals_for, a.avg_possession);

    FeatureVector {
        home_win_pct_l5: h.win_fraction,
        home_avg_goals_for_l5: h.avg_goals_for,
        home_avg_goals_against_l5: h.avg_goals_against,
        home_avg_shots_for_l5: h.avg_shots_for,
        home_avg_possession_l5: h.avg_possession,
        home_win_pct_home_l5: form.home_at_home.win_fraction,
        home_avg_goals_for_home_l5: form.home_at_home.avg_goals_for,
        away_win_pct_l5: a.win_fraction,
        away_avg_goals_for_l5: a.avg_goals_for,
        away_avg_goals_against_l5: a.avg_goals_against,
        away_avg_shots_for_l5: a.avg_shots_for,
        away_avg_possession_l5: a.avg_possession,
        away_win_pct_away_l5: form.away_on_road.win_fraction,
        away_avg_goals_for_away_l5: form.away_on_road.avg_goals_for,

        home_shot_accuracy: h.shot_accuracy,
        away_shot_accuracy: a.shot_accuracy,
        shot_accuracy_diff: h.shot_accuracy - a.shot_accuracy,
        home_conversion_rate: h.conversion_rate,
        away_conversion_rate: a.conversion_rate,
        conversion_diff: h.conversion_rate - a.conversion_rate,
        home_defensive_efficiency: h.defensive_efficiency,
        away_defensive_efficiency: a.defensive_efficiency,
        // Lower efficiency is the better defence, so positive favours the home side.
        defensive_diff: a.defensive_efficiency - h.defensive_efficiency,
        home_poss_efficiency,
        away_poss_efficiency,
        poss_efficiency_diff: home_poss_efficiency - away_poss_efficiency,
        home_corner_effectiveness: ratio(h.avg_goals_for, h.avg_corners_for),
        away_corner_effectiveness: ratio(a.avg_goals_for, a.avg_corners_for),

        form_diff: h.win_fraction - a.win_fraction,
        goal_diff_comparison: f64::from(h.goal_difference - a.goal_difference),
        points_diff: f64::from(h.points) - f64::from(a.points),
        home_advantage: form.home_at_home.win_fraction - form.away_on_road.win_fraction,
        home_attack_vs_away_defense: h.avg_goals_for - a.avg_goals_against,
        away_attack_vs_home_defense: a.avg_goals_for - h.avg_goals_against,
        home_recent_points: f64::from(h.points),
        away_recent_points: f64::from(a.points),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Ordered feature names a model was fitted against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fails on the first count or position difference.
    pub fn ensure_matches(&self, other: &FeatureSchema) -> EngineResult<()> {
        if self.names.len() != other.names.len() {
            return Err(EngineError::ContractMismatch(format!(
                "expected {} features, found {}",
                self.names.len(),
                other.names.len()
            )));
        }
        for (idx, (expected, found)) in self.names.iter().zip(&other.names).enumerate() {
            if expected != found {
                return Err(EngineError::ContractMismatch(format!(
                    "feature {idx} is {found:?}, expected {expected:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{FEATURE_COUNT, FEATURE_NAMES, FeatureSchema, FeatureVector};
    use crate::error::EngineError;

    #[test]
    fn feature_names_are_unique() {
        let unique: HashSet<&str> = FEATURE_NAMES.iter().copied().collect();
        assert_eq!(unique.len(), FEATURE_COUNT);
    }

    #[test]
    fn array_order_matches_names() {
        let mut values = [0.0; FEATURE_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f64;
        }
        let vector = FeatureVector::from_array(values);
        assert_eq!(vector.to_array(), values);
        assert_eq!(vector.defensive_diff, 22.0);
        assert_eq!(vector.form_diff, 28.0);

        let json = serde_json::to_value(vector).expect("serialize");
        for (name, value) in vector.named() {
            assert_eq!(json[name].as_f64(), Some(value), "{name}");
        }
    }

    #[test]
    fn schema_rejects_reordered_names() {
        let current = FeatureSchema::current();
        let mut names = current.names().to_vec();
        names.swap(0, 1);
        let swapped = FeatureSchema::from_names(names);
        assert!(matches!(
            current.ensure_matches(&swapped),
            Err(EngineError::ContractMismatch(_))
        ));

        let short = FeatureSchema::from_names(current.names()[..35].to_vec());
        assert!(current.ensure_matches(&short).is_err());
        assert!(current.ensure_matches(&FeatureSchema::current()).is_ok());
    }
}
