//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Second-order boosting on the logistic loss with a positive-class weight,
//! histogram CART trees, row/column subsampling from seeded per-round RNG
//! streams and early stopping on the last eval set.

use churn_core::gbdt::{logit, sigmoid, EvalHistory, GbdtModel, Tree};
use churn_core::params::format_params;
use churn_core::{ChurnError, ParamMap};
use rand::seq::index::sample;
use rand::Rng;
use tracing::{debug, info};

use crate::binning::BinnedMatrix;
use crate::cart::{CartBuilder, TreeConfig};
use crate::deterministic::stream_rng;
use crate::early_stopping::EarlyStopping;
use crate::errors::{Result, TrainerError};
use crate::matrix::TypedMatrix;
use crate::params::BoostParams;

/// Smallest hessian fed to the tree builder
const MIN_HESSIAN: f64 = 1e-16;

/// Named matrix scored after every round
#[derive(Clone, Copy, Debug)]
pub struct EvalSet<'a> {
    pub name: &'a str,
    pub matrix: &'a TypedMatrix,
}

impl<'a> EvalSet<'a> {
    pub fn new(name: &'a str, matrix: &'a TypedMatrix) -> Self {
        Self { name, matrix }
    }
}

/// Round budget and reporting cadence
#[derive(Clone, Debug, PartialEq)]
pub struct BoostSchedule {
    pub num_boost_round: usize,
    /// Stop after this many rounds without improvement on the last eval set
    pub early_stopping_rounds: Option<usize>,
    /// Log eval metrics every this many rounds
    pub verbose_eval: Option<usize>,
}

impl BoostSchedule {
    pub fn new(num_boost_round: usize) -> Self {
        Self {
            num_boost_round,
            early_stopping_rounds: None,
            verbose_eval: None,
        }
    }

    pub fn with_early_stopping(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = Some(rounds);
        self
    }

    pub fn with_verbose_eval(mut self, every: usize) -> Self {
        self.verbose_eval = (every > 0).then_some(every);
        self
    }
}

/// Anything that can fit a boosted classifier from typed matrices
pub trait BoosterTrainer: Send + Sync {
    fn train(
        &self,
        train: &TypedMatrix,
        evals: &[EvalSet<'_>],
        params: &ParamMap,
        schedule: &BoostSchedule,
    ) -> Result<GbdtModel>;
}

/// Histogram GBDT trainer for the binary logistic objective
#[derive(Clone, Debug, Default)]
pub struct GbdtTrainer;

impl GbdtTrainer {
    pub fn new() -> Self {
        Self
    }

    fn check_inputs(train: &TypedMatrix, evals: &[EvalSet<'_>], schedule: &BoostSchedule) -> Result<()> {
        if schedule.num_boost_round == 0 {
            return Err(ChurnError::config("model.num_boost_round", "must be at least 1").into());
        }
        if schedule.early_stopping_rounds.is_some() && evals.is_empty() {
            return Err(ChurnError::config(
                "model.early_stopping_rounds",
                "early stopping needs at least one eval set",
            )
            .into());
        }
        if train.is_empty() {
            return Err(TrainerError::Training("training matrix has no rows".to_string()));
        }
        for eval in evals {
            if eval.matrix.feature_names != train.feature_names {
                return Err(ChurnError::data(format!(
                    "eval set `{}` columns differ from the training matrix",
                    eval.name
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Weighted positive rate clamped away from 0 and 1
    fn base_margin(params: &BoostParams, labels: &[u8]) -> f64 {
        let probability = params.base_score.unwrap_or_else(|| {
            let positive_weight = labels.iter().filter(|&&y| y == 1).count() as f64 * params.scale_pos_weight;
            let negative_weight = labels.iter().filter(|&&y| y == 0).count() as f64;
            let total = positive_weight + negative_weight;
            if total > 0.0 {
                positive_weight / total
            } else {
                0.5
            }
        });
        logit(probability.clamp(1e-6, 1.0 - 1e-6))
    }

    fn gradients(
        params: &BoostParams,
        labels: &[u8],
        margins: &[f64],
        gradients: &mut [f64],
        hessians: &mut [f64],
    ) {
        for (i, (&y, &margin)) in labels.iter().zip(margins).enumerate() {
            let p = sigmoid(margin);
            let weight = if y == 1 { params.scale_pos_weight } else { 1.0 };
            gradients[i] = weight * (p - f64::from(y));
            hessians[i] = (weight * p * (1.0 - p)).max(MIN_HESSIAN);
        }
    }

    fn sample_rows(params: &BoostParams, n_rows: usize, rng: &mut impl Rng) -> Vec<usize> {
        if params.subsample >= 1.0 {
            return (0..n_rows).collect();
        }
        (0..n_rows).filter(|_| rng.gen::<f64>() < params.subsample).collect()
    }

    fn sample_features(params: &BoostParams, n_features: usize, rng: &mut impl Rng) -> Vec<usize> {
        if params.colsample_bytree >= 1.0 || n_features == 0 {
            return (0..n_features).collect();
        }
        let keep = ((params.colsample_bytree * n_features as f64).floor() as usize).clamp(1, n_features);
        let mut features = sample(rng, n_features, keep).into_vec();
        features.sort_unstable();
        features
    }

    fn add_tree(tree: &Tree, rows: &[Vec<f64>], margins: &mut [f64]) {
        for (margin, row) in margins.iter_mut().zip(rows) {
            *margin += tree.evaluate(row);
        }
    }
}

impl BoosterTrainer for GbdtTrainer {
    fn train(
        &self,
        train: &TypedMatrix,
        evals: &[EvalSet<'_>],
        params: &ParamMap,
        schedule: &BoostSchedule,
    ) -> Result<GbdtModel> {
        let boost = BoostParams::from_params(params)?;
        Self::check_inputs(train, evals, schedule)?;

        debug!("Booster params: {}", format_params(params));

        let binned = BinnedMatrix::from_matrix(train, boost.max_bin);
        let tree_config = TreeConfig {
            max_depth: boost.max_depth,
            min_child_weight: boost.min_child_weight,
            lambda: boost.lambda,
            alpha: boost.alpha,
            gamma: boost.gamma,
            eta: boost.eta,
            max_cat_to_onehot: boost.max_cat_to_onehot,
        };

        let base_margin = Self::base_margin(&boost, &train.labels);
        let n_rows = train.num_rows();
        let mut margins = vec![base_margin; n_rows];
        let mut eval_margins: Vec<Vec<f64>> = evals
            .iter()
            .map(|eval| vec![base_margin; eval.matrix.num_rows()])
            .collect();
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];

        let metric = boost.eval_metric;
        let mut history = EvalHistory::new(metric.name());
        let mut early_stopping = schedule
            .early_stopping_rounds
            .map(|patience| EarlyStopping::new(patience, metric.higher_is_better()));
        let mut trees = Vec::with_capacity(schedule.num_boost_round);

        for round in 0..schedule.num_boost_round {
            Self::gradients(&boost, &train.labels, &margins, &mut gradients, &mut hessians);

            let mut rng = stream_rng(boost.seed, round as u64);
            let rows = Self::sample_rows(&boost, n_rows, &mut rng);
            let features = Self::sample_features(&boost, train.num_features(), &mut rng);

            let tree = CartBuilder::new(&binned, &gradients, &hessians, tree_config.clone()).build(&rows, &features);

            Self::add_tree(&tree, &train.rows, &mut margins);
            if margins.iter().any(|m| !m.is_finite()) {
                return Err(TrainerError::Training(format!(
                    "training margins diverged at round {}",
                    round
                )));
            }

            let mut line = Vec::with_capacity(evals.len());
            let mut monitored = None;
            for (eval, eval_margin) in evals.iter().zip(eval_margins.iter_mut()) {
                Self::add_tree(&tree, &eval.matrix.rows, eval_margin);
                let probabilities: Vec<f64> = eval_margin.iter().map(|&m| sigmoid(m)).collect();
                let value = metric.evaluate(&eval.matrix.labels, &probabilities)?;
                history.push(eval.name, value);
                line.push(format!("{}-{}:{:.5}", eval.name, metric, value));
                monitored = Some(value);
            }
            trees.push(tree);

            let last_round = round + 1 == schedule.num_boost_round;
            if let Some(every) = schedule.verbose_eval {
                if !line.is_empty() && (round % every == 0 || last_round) {
                    info!("[{}] {}", round, line.join("\t"));
                }
            }

            if let (Some(stopper), Some(value)) = (early_stopping.as_mut(), monitored) {
                if stopper.should_stop(value) {
                    history.stopped_early = true;
                    debug!(
                        round,
                        best_round = ?stopper.best_round(),
                        "Stopping: no improvement for {} rounds",
                        stopper.rounds_without_improvement()
                    );
                    break;
                }
            }
        }

        let mut model = GbdtModel::new(
            trees,
            base_margin,
            train.feature_names.clone(),
            train.feature_types.clone(),
        );
        if let Some(stopper) = &early_stopping {
            model.best_iteration = stopper.best_round();
            model.best_score = stopper.best_value();
            if !history.stopped_early {
                debug!(
                    "{} rounds exhausted before early stopping (best round {:?})",
                    schedule.num_boost_round,
                    stopper.best_round()
                );
            }
        }
        model.params = params.clone();
        model.history = history;
        model.validate()?;

        Ok(model)
    }
}
