//! Evaluation metrics for trained models.
//!
//! Exact-match scoring: a prediction counts as correct only when its span
//! boundaries and label both equal a gold annotation. Each gold annotation
//! can be matched at most once.

use crate::detectors::statistical::NerModel;
use crate::training::data::TrainingExample;
use serde::{Deserialize, Serialize};

/// Precision/recall/F1 over a held-out test set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Fraction of predictions that match a gold annotation.
    pub precision: f64,
    /// Fraction of gold annotations that were predicted.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Number of test examples scored.
    pub test_samples: usize,
}

impl EvalMetrics {
    /// Zero metrics over an empty test set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            test_samples: 0,
        }
    }

    fn from_counts(true_positives: usize, predicted: usize, gold: usize, samples: usize) -> Self {
        let precision = if predicted == 0 {
            0.0
        } else {
            true_positives as f64 / predicted as f64
        };
        let recall = if gold == 0 {
            0.0
        } else {
            true_positives as f64 / gold as f64
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            test_samples: samples,
        }
    }
}

/// Score a model against gold examples with exact span + label matching.
#[must_use]
pub fn evaluate(model: &dyn NerModel, examples: &[TrainingExample]) -> EvalMetrics {
    if examples.is_empty() {
        return EvalMetrics::empty();
    }

    let mut true_positives = 0;
    let mut predicted_total = 0;
    let mut gold_total = 0;

    for example in examples {
        let predicted = match model.tag(&example.text) {
            Ok(entities) => entities,
            Err(e) => {
                log::warn!("Evaluation inference failed, counting zero predictions: {e}");
                Vec::new()
            }
        };
        predicted_total += predicted.len();
        gold_total += example.spans.len();

        let mut matched = vec![false; example.spans.len()];
        for p in &predicted {
            let hit = example.spans.iter().enumerate().find(|(idx, gold)| {
                !matched[*idx] && gold.start == p.start && gold.end == p.end && gold.label == p.tag
            });
            if let Some((idx, _)) = hit {
                matched[idx] = true;
                true_positives += 1;
            }
        }
    }

    let metrics =
        EvalMetrics::from_counts(true_positives, predicted_total, gold_total, examples.len());
    log::info!(
        "Evaluation: precision {:.3}, recall {:.3}, f1 {:.3} over {} samples",
        metrics.precision,
        metrics.recall,
        metrics.f1,
        metrics.test_samples
    );
    metrics
}
