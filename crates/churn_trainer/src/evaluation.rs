//! Held-out evaluation and feature importance
//!
//! Metrics are computed on predictions truncated at the model's best round.
//! Names follow `<metric>_<partition>`, e.g. `pr_auc_val` or
//! `precision_at_10_test`.

use churn_core::metrics::{average_precision, precision_at_k, roc_auc, top_k_label};
use churn_core::{FeatureType, GbdtModel, MetricsRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Result;
use crate::matrix::TypedMatrix;

/// Average split gain of one feature
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub feature_type: FeatureType,
    /// Total gain divided by the number of splits
    pub gain: f64,
    pub splits: usize,
}

/// Score `model` on the validation and test partitions
pub fn evaluate(
    model: &GbdtModel,
    val: &TypedMatrix,
    test: &TypedMatrix,
    top_k: &[f64],
) -> Result<MetricsRecord> {
    let mut metrics = MetricsRecord::new();
    for (partition, matrix) in [("val", val), ("test", test)] {
        score_partition(model, partition, matrix, top_k, &mut metrics)?;
    }

    for (name, value) in metrics.iter() {
        info!("{}: {:.4}", name, value);
    }
    Ok(metrics)
}

fn score_partition(
    model: &GbdtModel,
    partition: &str,
    matrix: &TypedMatrix,
    top_k: &[f64],
    metrics: &mut MetricsRecord,
) -> Result<()> {
    let probabilities = model.predict_proba_rows(&matrix.rows);
    let labels = &matrix.labels;

    metrics.insert(format!("roc_auc_{partition}"), roc_auc(labels, &probabilities)?);
    metrics.insert(format!("pr_auc_{partition}"), average_precision(labels, &probabilities)?);
    for &k in top_k {
        metrics.insert(
            format!("precision_at_{}_{partition}", top_k_label(k)),
            precision_at_k(labels, &probabilities, k)?,
        );
    }
    Ok(())
}

/// Average gain per used feature, highest first
///
/// Features that never split are left out. Ties keep feature order.
pub fn feature_importance(model: &GbdtModel) -> Vec<FeatureImportance> {
    let mut importance: Vec<FeatureImportance> = model
        .split_gain_by_feature()
        .into_iter()
        .enumerate()
        .filter(|(_, (_, splits))| *splits > 0)
        .map(|(idx, (total_gain, splits))| FeatureImportance {
            name: model.feature_names[idx].clone(),
            feature_type: model.feature_types[idx],
            gain: total_gain / splits as f64,
            splits,
        })
        .collect();
    importance.sort_by(|a, b| b.gain.total_cmp(&a.gain));

    for (rank, entry) in importance.iter().enumerate() {
        info!(
            rank = rank + 1,
            splits = entry.splits,
            "{} ({}): average gain {:.4}",
            entry.name,
            entry.feature_type.as_str(),
            entry.gain
        );
    }
    importance
}
