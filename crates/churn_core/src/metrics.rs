//! Binary classification metrics
//!
//! Discrimination metrics (ROC-AUC, average precision) are undefined when a
//! partition holds a single class. They return a `DataIntegrity` error in that
//! case instead of NaN so a degenerate split can never be reported as a score.

use crate::config::validate_top_k;
use crate::errors::{ChurnError, Result};
use crate::floor_fraction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named evaluation results (metric name → value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsRecord(BTreeMap<String, f64>);

impl MetricsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Area under the ROC curve (ties contribute half)
pub fn roc_auc(y_true: &[u8], y_score: &[f64]) -> Result<f64> {
    let (positives, negatives) = check_two_classes(y_true, y_score, "ROC-AUC")?;
    let order = descending_order(y_score);

    let mut area = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut i = 0;
    while i < order.len() {
        let (group_tp, group_fp, next) = score_group(&order, y_true, y_score, i);
        // Trapezoid between the previous and the current operating point
        area += group_fp * (2.0 * tp + group_tp) / 2.0;
        tp += group_tp;
        fp += group_fp;
        i = next;
    }

    debug_assert_eq!(tp as usize, positives);
    debug_assert_eq!(fp as usize, negatives);
    Ok(area / (positives as f64 * negatives as f64))
}

/// Average precision: `sum_n (R_n - R_{n-1}) * P_n` over distinct thresholds
pub fn average_precision(y_true: &[u8], y_score: &[f64]) -> Result<f64> {
    let (positives, _) = check_two_classes(y_true, y_score, "average precision")?;
    let order = descending_order(y_score);

    let mut ap = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut prev_recall = 0.0;
    let mut i = 0;
    while i < order.len() {
        let (group_tp, group_fp, next) = score_group(&order, y_true, y_score, i);
        tp += group_tp;
        fp += group_fp;
        let recall = tp / positives as f64;
        let precision = tp / (tp + fp);
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        i = next;
    }

    Ok(ap)
}

/// Precision over the `max(1, floor(k * n))` highest-scored examples
///
/// Ties keep their input order (stable sort), so repeated calls on the same
/// input always select the same examples.
pub fn precision_at_k(y_true: &[u8], y_score: &[f64], k: f64) -> Result<f64> {
    validate_top_k(k)?;
    check_inputs(y_true, y_score)?;

    let n = floor_fraction(k, y_true.len()).max(1);
    let order = descending_order(y_score);
    let hits = order[..n].iter().filter(|&&idx| y_true[idx] == 1).count();

    Ok(hits as f64 / n as f64)
}

/// Mean binary cross-entropy of predicted probabilities
pub fn log_loss(y_true: &[u8], y_prob: &[f64]) -> Result<f64> {
    check_inputs(y_true, y_prob)?;
    const EPS: f64 = 1e-15;

    let total: f64 = y_true
        .iter()
        .zip(y_prob)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();

    Ok(total / y_true.len() as f64)
}

/// Fraction of examples misclassified at the 0.5 threshold
pub fn error_rate(y_true: &[u8], y_prob: &[f64]) -> Result<f64> {
    check_inputs(y_true, y_prob)?;
    let wrong = y_true
        .iter()
        .zip(y_prob)
        .filter(|(&y, &p)| (p > 0.5) != (y == 1))
        .count();
    Ok(wrong as f64 / y_true.len() as f64)
}

/// Metric name suffix for a top-k fraction (`0.05` → `5`)
pub fn top_k_label(k: f64) -> String {
    format!("{}", (k * 100.0).round() as i64)
}

fn check_inputs(y_true: &[u8], y_score: &[f64]) -> Result<()> {
    if y_true.len() != y_score.len() {
        return Err(ChurnError::data(format!(
            "label/score length mismatch: {} labels, {} scores",
            y_true.len(),
            y_score.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ChurnError::data("cannot score an empty partition"));
    }
    if let Some(label) = y_true.iter().find(|&&y| y > 1) {
        return Err(ChurnError::data(format!("label {label} is not binary")));
    }
    if y_score.iter().any(|s| !s.is_finite()) {
        return Err(ChurnError::data("scores contain non-finite values"));
    }
    Ok(())
}

fn check_two_classes(y_true: &[u8], y_score: &[f64], metric: &str) -> Result<(usize, usize)> {
    check_inputs(y_true, y_score)?;
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ChurnError::data(format!(
            "{metric} is undefined for a one-class partition ({positives} positives, {negatives} negatives)"
        )));
    }
    Ok((positives, negatives))
}

/// Indices sorted by descending score, stable for ties
fn descending_order(y_score: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[b].total_cmp(&y_score[a]));
    order
}

/// Count positives/negatives sharing the score at `order[start]`
fn score_group(order: &[usize], y_true: &[u8], y_score: &[f64], start: usize) -> (f64, f64, usize) {
    let score = y_score[order[start]];
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut i = start;
    while i < order.len() && y_score[order[i]] == score {
        if y_true[order[i]] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        i += 1;
    }
    (tp, fp, i)
}
