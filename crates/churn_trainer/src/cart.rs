//! CART (Classification and Regression Tree) builder
//!
//! Second-order histogram tree construction over a [`BinnedMatrix`].
//! Split search scans one histogram per feature in parallel and reduces the
//! candidates with a deterministic tie-breaker, so the tree does not depend
//! on thread scheduling.

use churn_core::gbdt::{Node, Tree};
use rayon::prelude::*;

use crate::binning::{BinMapper, BinnedMatrix, MISSING_BIN};
use crate::deterministic::SplitTieBreaker;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub eta: f64,
    pub max_cat_to_onehot: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_child_weight: 1.0,
            lambda: 1.0,
            alpha: 0.0,
            gamma: 0.0,
            eta: 0.3,
            max_cat_to_onehot: 4,
        }
    }
}

/// Gradient statistics of a row set
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct GradStats {
    grad: f64,
    hess: f64,
    count: usize,
}

impl GradStats {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn merge(&mut self, other: &GradStats) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    fn minus(&self, other: &GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

/// How rows are routed at a split
#[derive(Clone, Debug, PartialEq)]
enum SplitRule {
    /// `bin <= b` goes left (missing bin included)
    Numeric { bin: u32 },
    /// Listed bins go left, everything else (missing included) goes right
    Categorical { bins: Vec<u32> },
}

impl SplitRule {
    fn goes_left(&self, bin: u32) -> bool {
        match self {
            SplitRule::Numeric { bin: b } => bin <= *b,
            SplitRule::Categorical { bins } => bins.binary_search(&bin).is_ok(),
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Clone, Debug)]
struct SplitCandidate {
    feature_idx: usize,
    rule: SplitRule,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, rule: SplitRule, gain: f64, key: u32, node_id: usize) -> Self {
        Self {
            feature_idx,
            rule,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, key, node_id),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Build a regression tree over binned features
pub struct CartBuilder<'a> {
    config: TreeConfig,
    binned: &'a BinnedMatrix,
    gradients: &'a [f64],
    hessians: &'a [f64],
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        binned: &'a BinnedMatrix,
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        Self {
            config,
            binned,
            gradients,
            hessians,
        }
    }

    /// Grow a tree on the given rows using only the given features
    pub fn build(&self, rows: &[usize], features: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, features, 0, &mut nodes);
        Tree::new(nodes)
    }

    /// Recursively build tree nodes; children are emitted after their parent
    fn build_node(&self, rows: &[usize], features: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len() as i32;
        let total = self.sum_stats(rows);
        let leaf = Node::leaf(current_idx, self.leaf_value(&total)).with_stats(0.0, total.hess);

        if depth >= self.config.max_depth || rows.len() < 2 {
            nodes.push(leaf);
            return current_idx;
        }

        let Some(split) = self.find_best_split(rows, features, &total, current_idx as usize) else {
            nodes.push(leaf);
            return current_idx;
        };

        let column = &self.binned.columns[split.feature_idx];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().copied().partition(|&row| split.rule.goes_left(column[row]));

        // Placeholder; children indices are known after recursion
        nodes.push(leaf);

        let left = self.build_node(&left_rows, features, depth + 1, nodes);
        let right = self.build_node(&right_rows, features, depth + 1, nodes);

        let mapper = &self.binned.mappers[split.feature_idx];
        let feature = split.feature_idx as i32;
        let node = match &split.rule {
            SplitRule::Numeric { bin } => {
                let threshold = mapper.threshold(*bin).unwrap_or(f64::MAX);
                Node::internal(current_idx, feature, threshold, left, right)
            }
            SplitRule::Categorical { bins } => {
                let codes = bins.iter().filter_map(|&b| mapper.category(b)).collect();
                Node::categorical(current_idx, feature, codes, left, right)
            }
        };
        nodes[current_idx as usize] = node.with_stats(split.gain, total.hess);

        current_idx
    }

    /// Best split over all candidate features
    fn find_best_split(
        &self,
        rows: &[usize],
        features: &[usize],
        total: &GradStats,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let candidates: Vec<SplitCandidate> = features
            .par_iter()
            .filter_map(|&feature| self.best_split_for_feature(rows, feature, total, node_id))
            .collect();

        candidates.into_iter().fold(None, |best, candidate| match best {
            Some(current) if !candidate.beats(&current) => Some(current),
            _ => Some(candidate),
        })
    }

    fn best_split_for_feature(
        &self,
        rows: &[usize],
        feature: usize,
        total: &GradStats,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let mapper = &self.binned.mappers[feature];
        let histogram = self.histogram(rows, feature, mapper.num_bins());

        match mapper {
            BinMapper::Numeric { .. } => self.scan_numeric(&histogram, feature, total, node_id),
            BinMapper::Categorical { .. } => self.scan_categorical(&histogram, feature, total, node_id),
        }
    }

    fn histogram(&self, rows: &[usize], feature: usize, num_bins: usize) -> Vec<GradStats> {
        let column = &self.binned.columns[feature];
        let mut histogram = vec![GradStats::default(); num_bins];
        for &row in rows {
            histogram[column[row] as usize].add(self.gradients[row], self.hessians[row]);
        }
        histogram
    }

    /// Left = missing bin plus bins `1..=b`
    fn scan_numeric(
        &self,
        histogram: &[GradStats],
        feature: usize,
        total: &GradStats,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        let mut left = histogram[MISSING_BIN as usize];

        for bin in 1..histogram.len().saturating_sub(1) {
            left.merge(&histogram[bin]);
            let right = total.minus(&left);
            if let Some(gain) = self.split_gain(&left, &right, total) {
                let candidate = SplitCandidate::new(
                    feature,
                    SplitRule::Numeric { bin: bin as u32 },
                    gain,
                    bin as u32,
                    node_id,
                );
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// One-vs-rest for low observed cardinality, otherwise the best prefix of
    /// the categories ordered by `G / (H + lambda)`
    fn scan_categorical(
        &self,
        histogram: &[GradStats],
        feature: usize,
        total: &GradStats,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let observed: Vec<u32> = (1..histogram.len() as u32)
            .filter(|&b| histogram[b as usize].count > 0)
            .collect();
        if observed.len() < 2 {
            return None;
        }

        let mut best: Option<SplitCandidate> = None;
        let mut consider = |bins: Vec<u32>, left: GradStats, key: u32| {
            let right = total.minus(&left);
            if let Some(gain) = self.split_gain(&left, &right, total) {
                let mut bins = bins;
                bins.sort_unstable();
                let candidate =
                    SplitCandidate::new(feature, SplitRule::Categorical { bins }, gain, key, node_id);
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        };

        if observed.len() <= self.config.max_cat_to_onehot {
            for &bin in &observed {
                consider(vec![bin], histogram[bin as usize], bin);
            }
        } else {
            let lambda = self.config.lambda;
            let mut ordered = observed;
            ordered.sort_by(|&a, &b| {
                let ratio = |s: &GradStats| s.grad / (s.hess + lambda);
                ratio(&histogram[a as usize])
                    .total_cmp(&ratio(&histogram[b as usize]))
                    .then(a.cmp(&b))
            });

            let mut left = GradStats::default();
            for prefix in 1..ordered.len() {
                left.merge(&histogram[ordered[prefix - 1] as usize]);
                consider(ordered[..prefix].to_vec(), left, prefix as u32);
            }
        }
        best
    }

    /// Loss reduction of a split, if it is admissible and beats `gamma`
    fn split_gain(&self, left: &GradStats, right: &GradStats, parent: &GradStats) -> Option<f64> {
        if left.count == 0 || right.count == 0 {
            return None;
        }
        if left.hess < self.config.min_child_weight || right.hess < self.config.min_child_weight {
            return None;
        }

        let gain = 0.5 * (self.score(left) + self.score(right) - self.score(parent));
        (gain.is_finite() && gain > self.config.gamma && gain > 0.0).then_some(gain)
    }

    /// Structure score `T(G)^2 / (H + lambda)`
    fn score(&self, stats: &GradStats) -> f64 {
        let denominator = stats.hess + self.config.lambda;
        if denominator <= 0.0 {
            return 0.0;
        }
        let g = soft_threshold(stats.grad, self.config.alpha);
        g * g / denominator
    }

    /// Optimal leaf weight `-T(G) / (H + lambda)` scaled by the learning rate
    fn leaf_value(&self, stats: &GradStats) -> f64 {
        let denominator = stats.hess + self.config.lambda;
        if denominator <= 0.0 {
            return 0.0;
        }
        -soft_threshold(stats.grad, self.config.alpha) / denominator * self.config.eta
    }

    fn sum_stats(&self, rows: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &row in rows {
            stats.add(self.gradients[row], self.hessians[row]);
        }
        stats
    }
}

/// L1 shrinkage of a gradient sum
fn soft_threshold(grad: f64, alpha: f64) -> f64 {
    if grad > alpha {
        grad - alpha
    } else if grad < -alpha {
        grad + alpha
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::TypedMatrix;
    use churn_core::FeatureType;

    fn binned(rows: Vec<Vec<f64>>, types: Vec<FeatureType>) -> BinnedMatrix {
        let names = (0..types.len()).map(|i| format!("f{i}")).collect();
        let labels = vec![0; rows.len()];
        let matrix = TypedMatrix {
            rows,
            labels,
            feature_names: names,
            feature_types: types,
        };
        BinnedMatrix::from_matrix(&matrix, 256)
    }

    fn unit_config() -> TreeConfig {
        TreeConfig {
            max_depth: 1,
            min_child_weight: 0.0,
            lambda: 0.0,
            eta: 1.0,
            ..TreeConfig::default()
        }
    }

    #[test]
    fn test_simple_numeric_stump() {
        let data = binned(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
            vec![FeatureType::Numeric],
        );
        let gradients = [-1.0, -1.0, 1.0, 1.0];
        let hessians = [1.0; 4];

        let tree = CartBuilder::new(&data, &gradients, &hessians, unit_config()).build(&[0, 1, 2, 3], &[0]);

        assert_eq!(tree.nodes.len(), 3);
        let root = &tree.nodes[0];
        assert_eq!(root.feature_idx, 0);
        assert_eq!(root.threshold, 2.0);
        assert_eq!(root.gain, 2.0);
        assert_eq!(root.cover, 4.0);
        assert!(tree.validate().is_ok());

        assert_eq!(tree.evaluate(&[1.5]), 1.0);
        assert_eq!(tree.evaluate(&[3.5]), -1.0);
        assert_eq!(tree.evaluate(&[f64::NAN]), 1.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let data = binned(vec![vec![1.0]], vec![FeatureType::Numeric]);
        let tree = CartBuilder::new(&data, &[-2.0], &[1.0], unit_config()).build(&[0], &[0]);

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf, Some(2.0));
    }

    #[test]
    fn test_constant_gradients_do_not_split() {
        let data = binned(
            vec![vec![1.0], vec![2.0], vec![3.0]],
            vec![FeatureType::Numeric],
        );
        let tree = CartBuilder::new(&data, &[0.5; 3], &[1.0; 3], unit_config()).build(&[0, 1, 2], &[0]);
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_min_child_weight_blocks_split() {
        let data = binned(vec![vec![1.0], vec![2.0]], vec![FeatureType::Numeric]);
        let config = TreeConfig {
            min_child_weight: 1.5,
            ..unit_config()
        };
        let tree = CartBuilder::new(&data, &[-1.0, 1.0], &[1.0, 1.0], config).build(&[0, 1], &[0]);
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_one_hot_categorical_split() {
        // Category 2 is the odd one out
        let data = binned(
            vec![vec![0.0], vec![1.0], vec![2.0], vec![2.0], vec![f64::NAN]],
            vec![FeatureType::Categorical],
        );
        let gradients = [1.0, 1.0, -1.0, -1.0, 1.0];
        let tree = CartBuilder::new(&data, &gradients, &[1.0; 5], unit_config()).build(&[0, 1, 2, 3, 4], &[0]);

        let root = &tree.nodes[0];
        assert_eq!(root.categories, Some(vec![2]));
        assert!(tree.evaluate(&[2.0]) > 0.0);
        assert!(tree.evaluate(&[0.0]) < 0.0);
        assert!(tree.evaluate(&[f64::NAN]) < 0.0);
    }

    #[test]
    fn test_partition_categorical_split() {
        // Six categories, codes {1, 3, 5} share negative gradients
        let rows: Vec<Vec<f64>> = (0..12).map(|i| vec![(i % 6) as f64]).collect();
        let gradients: Vec<f64> = (0..12).map(|i| if (i % 6) % 2 == 1 { -1.0 } else { 1.0 }).collect();
        let data = binned(rows, vec![FeatureType::Categorical]);
        let all_rows: Vec<usize> = (0..12).collect();

        let tree = CartBuilder::new(&data, &gradients, &[1.0; 12], unit_config()).build(&all_rows, &[0]);

        let root = &tree.nodes[0];
        assert_eq!(root.categories, Some(vec![1, 3, 5]));
        assert_eq!(root.gain, 6.0);
    }

    #[test]
    fn test_tie_goes_to_lower_feature() {
        // Both columns separate the rows identically
        let data = binned(
            vec![vec![1.0, 1.0], vec![2.0, 2.0]],
            vec![FeatureType::Numeric, FeatureType::Numeric],
        );
        let tree = CartBuilder::new(&data, &[-1.0, 1.0], &[1.0, 1.0], unit_config()).build(&[0, 1], &[0, 1]);
        assert_eq!(tree.nodes[0].feature_idx, 0);

        let tree = CartBuilder::new(&data, &[-1.0, 1.0], &[1.0, 1.0], unit_config()).build(&[0, 1], &[1]);
        assert_eq!(tree.nodes[0].feature_idx, 1);
    }

    #[test]
    fn test_depth_two_tree_is_valid() {
        let rows: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let gradients: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let data = binned(rows, vec![FeatureType::Numeric, FeatureType::Numeric]);
        let all_rows: Vec<usize> = (0..16).collect();

        let config = TreeConfig {
            max_depth: 2,
            ..unit_config()
        };
        let tree = CartBuilder::new(&data, &gradients, &[1.0; 16], config).build(&all_rows, &[0, 1]);

        assert!(tree.validate().is_ok());
        assert!(tree.nodes.len() <= 7);
        assert!(tree.nodes.iter().filter(|n| n.is_leaf()).all(|n| n.cover > 0.0));
    }
}
