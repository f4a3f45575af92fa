use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::ModelArtifact;
use crate::error::EngineResult;
use crate::features::{FeatureVector, assemble_features};
use crate::form::{FormSource, Lookback, MatchIndex};
use crate::ingest::StatsPolicy;
use crate::model::{Confidence, Fixture, FixtureId, Match, Outcome, Prob3};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub fixture_id: FixtureId,
    pub kickoff: DateTime<Utc>,
    pub home_name: String,
    pub away_name: String,
    pub probs: Prob3,
    pub predicted: Outcome,
    pub confidence: Confidence,
    pub model_version: String,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionRun {
    pub predictions: Vec<Prediction>,
    /// Fixtures without enough history on one side.
    pub skipped: Vec<FixtureId>,
}

/// Scores one fixture using only matches that kicked off before it.
///
/// `Ok(None)` means insufficient history. The artifact contract is assumed to
/// have been checked by the caller.
pub fn predict_fixture<S>(
    artifact: &ModelArtifact,
    history: &S,
    fixture: &Fixture,
    lookback: Lookback,
    policy: &StatsPolicy,
) -> EngineResult<Option<Prediction>>
where
    S: FormSource + ?Sized,
{
    let Some(features) = assemble_features(
        history,
        fixture.home_team,
        fixture.away_team,
        fixture.kickoff,
        lookback,
        policy,
    ) else {
        return Ok(None);
    };

    let scaled = artifact.scaler.transform(&features)?;
    let probs = artifact.predict(&scaled)?;
    Ok(Some(Prediction {
        fixture_id: fixture.id,
        kickoff: fixture.kickoff,
        home_name: fixture.home_name.clone(),
        away_name: fixture.away_name.clone(),
        predicted: probs.argmax(),
        confidence: Confidence::from_max_prob(probs.max()),
        probs,
        model_version: artifact.model_version.clone(),
        features,
    }))
}

/// Scores a batch. A contract mismatch aborts before any fixture is scored.
pub fn predict_fixtures(
    artifact: &ModelArtifact,
    history: &[Match],
    fixtures: &[Fixture],
    lookback: Lookback,
    policy: &StatsPolicy,
) -> EngineResult<PredictionRun> {
    artifact.check_contract(lookback)?;
    let index = MatchIndex::new(history);

    let mut run = PredictionRun::default();
    for fixture in fixtures {
        match predict_fixture(artifact, &index, fixture, lookback, policy)? {
            Some(prediction) => {
                log::debug!(
                    "{} vs {}: {} ({:.3}/{:.3}/{:.3})",
                    prediction.home_name,
                    prediction.away_name,
                    prediction.predicted.label(),
                    prediction.probs.home,
                    prediction.probs.draw,
                    prediction.probs.away
                );
                run.predictions.push(prediction);
            }
            None => {
                log::warn!(
                    "fixture {} ({} vs {}): insufficient historical data",
                    fixture.id,
                    fixture.home_name,
                    fixture.away_name
                );
                run.skipped.push(fixture.id);
            }
        }
    }
    Ok(run)
}
