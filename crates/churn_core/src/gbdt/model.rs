//! Boosted tree classifier with early-stopping aware inference
//!
//! The model keeps every tree it trained, but scoring stops at
//! `best_iteration` when one is recorded: rounds past the early-stopping point
//! are kept for diagnostics only.

use super::tree::Tree;
use crate::errors::{ChurnError, Result};
use crate::params::ParamMap;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use crate::types::FeatureType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current model format version
pub const MODEL_VERSION: i32 = 1;

/// Per-round evaluation curves recorded during training
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvalHistory {
    /// Name of the monitored metric (e.g. `logloss`, `aucpr`)
    pub metric: String,
    /// Eval set name → metric value per round
    pub curves: BTreeMap<String, Vec<f64>>,
    /// Whether early stopping ended training before the round cap
    pub stopped_early: bool,
}

impl EvalHistory {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, eval_name: &str, value: f64) {
        self.curves.entry(eval_name.to_string()).or_default().push(value);
    }

    pub fn curve(&self, eval_name: &str) -> Option<&[f64]> {
        self.curves.get(eval_name).map(Vec::as_slice)
    }
}

/// Binary boosted tree classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GbdtModel {
    /// Model format version
    pub version: i32,

    /// Initial margin added before any tree output
    pub base_margin: f64,

    /// Trees in boosting order
    pub trees: Vec<Tree>,

    /// Zero-based round with the best monitored eval score
    pub best_iteration: Option<usize>,

    /// Monitored eval score at `best_iteration`
    pub best_score: Option<f64>,

    /// Column names, indexed like the training matrix
    pub feature_names: Vec<String>,

    /// Column types, indexed like the training matrix
    pub feature_types: Vec<FeatureType>,

    /// Parameters the model was trained with
    #[serde(default)]
    pub params: ParamMap,

    #[serde(default)]
    pub history: EvalHistory,
}

impl GbdtModel {
    pub fn new(
        trees: Vec<Tree>,
        base_margin: f64,
        feature_names: Vec<String>,
        feature_types: Vec<FeatureType>,
    ) -> Self {
        Self {
            version: MODEL_VERSION,
            base_margin,
            trees,
            best_iteration: None,
            best_score: None,
            feature_names,
            feature_types,
            params: ParamMap::new(),
            history: EvalHistory::default(),
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != MODEL_VERSION {
            return Err(ChurnError::ModelValidation(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        if !self.base_margin.is_finite() {
            return Err(ChurnError::ModelValidation(
                "base margin is not finite".to_string(),
            ));
        }

        if self.feature_names.len() != self.feature_types.len() {
            return Err(ChurnError::ModelValidation(format!(
                "{} feature names but {} feature types",
                self.feature_names.len(),
                self.feature_types.len()
            )));
        }

        if let Some(best) = self.best_iteration {
            if best >= self.trees.len() {
                return Err(ChurnError::ModelValidation(format!(
                    "best iteration {} is beyond the {} trained trees",
                    best,
                    self.trees.len()
                )));
            }
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| {
                ChurnError::ModelValidation(format!("Tree {} validation failed: {}", i, e))
            })?;
            let out_of_range = tree
                .nodes
                .iter()
                .any(|node| !node.is_leaf() && node.feature_idx as usize >= self.feature_names.len());
            if out_of_range {
                return Err(ChurnError::ModelValidation(format!(
                    "Tree {} splits on a feature outside the {} declared columns",
                    i,
                    self.feature_names.len()
                )));
            }
        }

        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of trees used for scoring (truncated at the best round)
    pub fn scoring_trees(&self) -> usize {
        match self.best_iteration {
            Some(best) => (best + 1).min(self.trees.len()),
            None => self.trees.len(),
        }
    }

    /// Raw margin using the first `n_trees` trees
    pub fn predict_margin_with(&self, features: &[f64], n_trees: usize) -> f64 {
        self.trees
            .iter()
            .take(n_trees)
            .fold(self.base_margin, |sum, tree| sum + tree.evaluate(features))
    }

    /// Positive-class probability truncated at the best round
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_margin_with(features, self.scoring_trees()))
    }

    /// Probabilities for a batch of rows, truncated at the best round
    pub fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let n_trees = self.scoring_trees();
        rows.iter()
            .map(|row| sigmoid(self.predict_margin_with(row, n_trees)))
            .collect()
    }

    /// Gain statistics per feature over the scoring trees: (total gain, split count)
    pub fn split_gain_by_feature(&self) -> Vec<(f64, usize)> {
        let mut stats = vec![(0.0, 0usize); self.feature_names.len()];
        for tree in self.trees.iter().take(self.scoring_trees()) {
            for node in tree.nodes.iter().filter(|node| !node.is_leaf()) {
                if let Some(entry) = stats.get_mut(node.feature_idx as usize) {
                    entry.0 += node.gain;
                    entry.1 += 1;
                }
            }
        }
        stats
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    /// Blake3 hash of the canonical JSON, hex encoded
    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self)
    }

    /// Save model to JSON file with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let model: GbdtModel = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}

/// Logistic function
pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Inverse of the logistic function
pub fn logit(probability: f64) -> f64 {
    (probability / (1.0 - probability)).ln()
}
