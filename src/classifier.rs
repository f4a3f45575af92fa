//! Prediction consumer boundary.
//!
//! The classifier itself is fitted outside this crate. What lives here is the
//! artifact that carries it (feature names, scaler, coefficients) and the
//! checks that keep a stale artifact from scoring vectors it was not built for.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::features::{FEATURE_COUNT, FeatureSchema};
use crate::form::Lookback;
use crate::model::{Outcome, Prob3};
use crate::scaler::StandardScaler;

pub const ARTIFACT_VERSION: u32 = 1;
const PROB_SUM_TOLERANCE: f64 = 1e-6;

pub trait OutcomeClassifier {
    /// Takes a scaled row in feature-contract order.
    fn predict_proba(&self, scaled: &[f64]) -> EngineResult<Prob3>;
}

/// Multinomial linear model. Rows of `weights` are Home, Draw, Away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    pub weights: [Vec<f64>; 3],
    pub intercepts: [f64; 3],
}

impl SoftmaxModel {
    pub fn width(&self) -> usize {
        self.weights[0].len()
    }
}

impl OutcomeClassifier for SoftmaxModel {
    fn predict_proba(&self, scaled: &[f64]) -> EngineResult<Prob3> {
        if self.weights.iter().any(|row| row.len() != scaled.len()) {
            return Err(EngineError::ContractMismatch(format!(
                "classifier expects {} inputs, got {}",
                self.width(),
                scaled.len()
            )));
        }
        let mut logits = [0.0f64; 3];
        for (k, logit) in logits.iter_mut().enumerate() {
            *logit = self.intercepts[k]
                + self.weights[k]
                    .iter()
                    .zip(scaled)
                    .map(|(w, x)| w * x)
                    .sum::<f64>();
        }
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        validate_probs(Prob3 {
            home: exp[0] / total,
            draw: exp[1] / total,
            away: exp[2] / total,
        })
    }
}

/// Outcome base rates of the training set; ignores the features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalBaseline {
    pub probs: Prob3,
}

impl EmpiricalBaseline {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        if outcomes.is_empty() {
            return Self {
                probs: Prob3::uniform(),
            };
        }
        let mut home = 0usize;
        let mut draw = 0usize;
        let mut away = 0usize;
        for outcome in outcomes {
            match outcome {
                Outcome::Home => home += 1,
                Outcome::Draw => draw += 1,
                Outcome::Away => away += 1,
            }
        }
        let n = outcomes.len() as f64;
        Self {
            probs: Prob3 {
                home: home as f64 / n,
                draw: draw as f64 / n,
                away: away as f64 / n,
            },
        }
    }
}

impl OutcomeClassifier for EmpiricalBaseline {
    fn predict_proba(&self, _scaled: &[f64]) -> EngineResult<Prob3> {
        validate_probs(self.probs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    Softmax(SoftmaxModel),
    Baseline(EmpiricalBaseline),
}

impl OutcomeClassifier for ClassifierSpec {
    fn predict_proba(&self, scaled: &[f64]) -> EngineResult<Prob3> {
        match self {
            ClassifierSpec::Softmax(model) => model.predict_proba(scaled),
            ClassifierSpec::Baseline(model) => model.predict_proba(scaled),
        }
    }
}

pub fn validate_probs(p: Prob3) -> EngineResult<Prob3> {
    let values = [p.home, p.draw, p.away];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::InvalidProbabilities(format!(
            "non-finite or negative entry in {values:?}"
        )));
    }
    let sum = p.sum();
    if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
        return Err(EngineError::InvalidProbabilities(format!(
            "probabilities sum to {sum}"
        )));
    }
    Ok(p)
}

/// Everything inference needs from a training run, stored as one JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub lookback: Lookback,
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub classifier: ClassifierSpec,
}

impl ModelArtifact {
    pub fn new(
        model_version: impl Into<String>,
        lookback: Lookback,
        scaler: StandardScaler,
        classifier: ClassifierSpec,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            model_version: model_version.into(),
            created_at: Utc::now(),
            lookback,
            feature_names: FeatureSchema::current().names().to_vec(),
            scaler,
            classifier,
        }
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::from_names(self.feature_names.clone())
    }

    /// Fails when the artifact was fitted against another feature order,
    /// another lookback, or carries parameters of the wrong width.
    pub fn check_contract(&self, lookback: Lookback) -> EngineResult<()> {
        FeatureSchema::current().ensure_matches(&self.schema())?;
        self.scaler.validate()?;
        if self.lookback != lookback {
            return Err(EngineError::ContractMismatch(format!(
                "model fitted with lookback {}, configured lookback is {}",
                self.lookback.get(),
                lookback.get()
            )));
        }
        if let ClassifierSpec::Softmax(model) = &self.classifier
            && model.weights.iter().any(|row| row.len() != FEATURE_COUNT)
        {
            return Err(EngineError::ContractMismatch(format!(
                "softmax weights have width {}, expected {FEATURE_COUNT}",
                model.width()
            )));
        }
        Ok(())
    }

    pub fn predict(&self, scaled: &[f64]) -> EngineResult<Prob3> {
        self.classifier.predict_proba(scaled)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model artifact {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parse model artifact {}", path.display()))?;
        if artifact.version != ARTIFACT_VERSION {
            anyhow::bail!(
                "unsupported model artifact version {} (expected {ARTIFACT_VERSION})",
                artifact.version
            );
        }
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("serialize model artifact")?;
        fs::write(&tmp, json).context("write model artifact")?;
        fs::rename(&tmp, path).context("swap model artifact")?;
        Ok(())
    }
}
