//! Decision tree structures for boosted-tree inference
//!
//! Routing rules:
//! - numeric split: `value <= threshold` goes left, missing (NaN) goes left
//! - categorical split: codes in `categories` go left, everything else
//!   (other codes, unseen codes, missing) goes right

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0`, `left`/`right` point to child node
/// indices and `leaf` is `None`. Leaf nodes use `feature_idx == -1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (equal to its index in the tree)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    #[serde(rename = "feature_idx", alias = "feature")]
    pub feature_idx: i32,

    /// Threshold for numeric splits
    pub threshold: f64,

    /// Sorted category codes routed left, for categorical splits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<u32>>,

    /// Leaf value in margin space (Some for leaf nodes)
    pub leaf: Option<f64>,

    /// Loss reduction achieved by the split (0 for leaves)
    #[serde(default)]
    pub gain: f64,

    /// Sum of hessians of the training rows reaching the node
    #[serde(default)]
    pub cover: f64,
}

impl Node {
    /// Create a numeric split node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            categories: None,
            leaf: None,
            gain: 0.0,
            cover: 0.0,
        }
    }

    /// Create a categorical split node; `categories` go left
    pub fn categorical(
        id: i32,
        feature_idx: i32,
        mut categories: Vec<u32>,
        left: i32,
        right: i32,
    ) -> Self {
        categories.sort_unstable();
        categories.dedup();
        Self {
            categories: Some(categories),
            ..Self::internal(id, feature_idx, 0.0, left, right)
        }
    }

    /// Create a leaf node
    pub fn leaf(id: i32, value: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            categories: None,
            leaf: Some(value),
            gain: 0.0,
            cover: 0.0,
        }
    }

    /// Attach split statistics
    pub fn with_stats(mut self, gain: f64, cover: f64) -> Self {
        self.gain = gain;
        self.cover = cover;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    /// Whether a feature value is routed to the left child
    pub fn goes_left(&self, value: f64) -> bool {
        match &self.categories {
            Some(categories) => {
                if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                    return false;
                }
                value <= u32::MAX as f64 && categories.binary_search(&(value as u32)).is_ok()
            }
            None => value.is_nan() || value <= self.threshold,
        }
    }
}

/// A single regression tree of the ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on a feature row, returning the leaf value
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let value = match features.get(node.feature_idx as usize) {
                Some(&v) => v,
                None => f64::NAN,
            };

            let next = if node.goes_left(value) {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(value) if value.is_finite() => {}
                    Some(value) => return Err(format!("Leaf node {i} has non-finite value {value}")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            // Children are always emitted after their parent
            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }

            if node.feature_idx < 0 {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }
            if node.categories.is_none() && !node.threshold.is_finite() {
                return Err(format!("Node {i} has non-finite threshold"));
            }
        }

        Ok(())
    }
}
