//! Prediction accuracy: scoring stored predictions against final results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Confidence, FixtureId, Outcome, Prob3};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Multiclass Brier score, log-loss and argmax accuracy. Mismatched or empty
/// inputs give zero samples.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = Prob3::one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);
        log_loss_sum += -p.get(*outcome).clamp(1e-12, 1.0).ln();
        if p.argmax() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Reliability table for one class: predicted probability buckets against the
/// observed frequency of that class.
pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// A stored prediction whose fixture has not been scored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrediction {
    pub fixture_id: FixtureId,
    pub predicted: Outcome,
    pub probs: Prob3,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyRecord {
    pub fixture_id: FixtureId,
    pub predicted: Outcome,
    pub actual: Outcome,
    pub correct: bool,
    pub confidence: Confidence,
    pub probs: Prob3,
    pub prob_actual: f64,
    pub brier: f64,
    pub checked_at: DateTime<Utc>,
}

pub fn score_prediction(
    pending: &PendingPrediction,
    actual: Outcome,
    checked_at: DateTime<Utc>,
) -> AccuracyRecord {
    let metrics = evaluate_probs(&[pending.probs], &[actual]);
    AccuracyRecord {
        fixture_id: pending.fixture_id,
        predicted: pending.predicted,
        actual,
        correct: pending.predicted == actual,
        confidence: pending.confidence,
        probs: pending.probs,
        prob_actual: pending.probs.get(actual),
        brier: metrics.brier,
        checked_at,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketSummary {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

impl BucketSummary {
    fn add(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
        self.accuracy = self.correct as f64 / self.total as f64;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub overall: BucketSummary,
    pub by_confidence: BTreeMap<Confidence, BucketSummary>,
    pub mean_brier: f64,
}

pub fn summarize_accuracy(records: &[AccuracyRecord]) -> AccuracySummary {
    let mut summary = AccuracySummary::default();
    if records.is_empty() {
        return summary;
    }
    for record in records {
        summary.overall.add(record.correct);
        summary
            .by_confidence
            .entry(record.confidence)
            .or_default()
            .add(record.correct);
    }
    summary.mean_brier = records.iter().map(|r| r.brier).sum::<f64>() / records.len() as f64;
    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        PendingPrediction, calibration_bins, evaluate_probs, score_prediction, summarize_accuracy,
    };
    use crate::model::{Confidence, FixtureId, Outcome, Prob3};

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let outcomes = [Outcome::Home, Outcome::Draw, Outcome::Away];
        let preds: Vec<Prob3> = outcomes.iter().map(|o| Prob3::one_hot(*o)).collect();
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert_eq!(m.brier, 0.0);
        assert!(m.log_loss < 1e-9);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn mismatched_lengths_give_no_samples() {
        let m = evaluate_probs(&[Prob3::uniform()], &[]);
        assert_eq!(m.samples, 0);
    }

    #[test]
    fn calibration_bins_cover_unit_interval() {
        let preds = [
            Prob3 {
                home: 0.05,
                draw: 0.25,
                away: 0.70,
            },
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
        ];
        let bins = calibration_bins(&preds, &[Outcome::Away, Outcome::Home], Outcome::Home, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[9].count, 1);
        assert_eq!(bins[9].actual_rate, 1.0);
    }

    #[test]
    fn summary_splits_by_confidence() {
        let now = Utc::now();
        let pending = |id: u64, predicted: Outcome, confidence: Confidence| PendingPrediction {
            fixture_id: FixtureId(id),
            predicted,
            probs: Prob3::one_hot(predicted),
            confidence,
        };
        let records = vec![
            score_prediction(&pending(1, Outcome::Home, Confidence::High), Outcome::Home, now),
            score_prediction(&pending(2, Outcome::Home, Confidence::High), Outcome::Away, now),
            score_prediction(&pending(3, Outcome::Draw, Confidence::Low), Outcome::Draw, now),
        ];
        assert!(records[0].correct);
        assert!(!records[1].correct);
        assert_eq!(records[1].prob_actual, 0.0);

        let summary = summarize_accuracy(&records);
        assert_eq!(summary.overall.total, 3);
        assert_eq!(summary.overall.correct, 2);
        let high = summary.by_confidence[&Confidence::High];
        assert_eq!((high.total, high.correct), (2, 1));
        assert_eq!(high.accuracy, 0.5);
        assert!(!summary.by_confidence.contains_key(&Confidence::Medium));
    }
}
