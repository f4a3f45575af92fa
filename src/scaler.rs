use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::features::{FEATURE_COUNT, FeatureSchema, FeatureVector};

/// Standard deviations below this are treated as a constant field.
const STD_EPSILON: f64 = 1e-12;

/// Per-field standardization fitted once on the training matrix and stored
/// with the model so inference applies the exact same transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation (N denominator).
    pub std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector]) -> EngineResult<Self> {
        if rows.is_empty() {
            return Err(EngineError::EmptyTrainingSet);
        }
        let n = rows.len() as f64;
        let mut sum = [0.0f64; FEATURE_COUNT];
        for row in rows {
            for (acc, v) in sum.iter_mut().zip(row.to_array()) {
                *acc += v;
            }
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();

        let mut sq = [0.0f64; FEATURE_COUNT];
        for row in rows {
            for (i, v) in row.to_array().into_iter().enumerate() {
                sq[i] += (v - mean[i]).powi(2);
            }
        }
        let std = sq.iter().map(|s| (s / n).sqrt()).collect();

        Ok(Self {
            feature_names: FeatureSchema::current().names().to_vec(),
            mean,
            std,
        })
    }

    /// Identity transform over the current schema.
    pub fn identity() -> Self {
        Self {
            feature_names: FeatureSchema::current().names().to_vec(),
            mean: vec![0.0; FEATURE_COUNT],
            std: vec![1.0; FEATURE_COUNT],
        }
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::from_names(self.feature_names.clone())
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Checks the stored names and parameter lengths against the compiled order.
    pub fn validate(&self) -> EngineResult<()> {
        FeatureSchema::current().ensure_matches(&self.schema())?;
        if self.mean.len() != FEATURE_COUNT || self.std.len() != FEATURE_COUNT {
            return Err(EngineError::ContractMismatch(format!(
                "scaler carries {} means and {} deviations for {FEATURE_COUNT} features",
                self.mean.len(),
                self.std.len()
            )));
        }
        Ok(())
    }

    pub fn transform_values(&self, values: &[f64]) -> EngineResult<Vec<f64>> {
        if values.len() != self.mean.len() || values.len() != self.std.len() {
            return Err(EngineError::ContractMismatch(format!(
                "scaler fitted on {} features, got {}",
                self.mean.len(),
                values.len()
            )));
        }
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (mean, std))| {
                if *std < STD_EPSILON {
                    0.0
                } else {
                    (x - mean) / std
                }
            })
            .collect())
    }

    pub fn transform(&self, features: &FeatureVector) -> EngineResult<Vec<f64>> {
        self.transform_values(&features.to_array())
    }

    /// Reads a scaler written by [`StandardScaler::save`] and rejects one
    /// fitted against a different feature order.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read scaler {}", path.display()))?;
        let scaler: StandardScaler = serde_json::from_str(&raw)
            .with_context(|| format!("parse scaler {}", path.display()))?;
        scaler
            .validate()
            .with_context(|| format!("scaler {} does not fit this build", path.display()))?;
        Ok(scaler)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("serialize scaler")?;
        fs::write(&tmp, json).context("write scaler")?;
        fs::rename(&tmp, path).context("swap scaler")?;
        Ok(())
    }
}
