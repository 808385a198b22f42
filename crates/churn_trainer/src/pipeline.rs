//! End-to-end training run
//!
//! dataset → cohort split → typed matrices → scale weight → search →
//! final model → evaluation. The configuration is validated up front and
//! passed by reference to every stage.

use churn_core::{GbdtModel, MetricsRecord, ParamMap, PipelineConfig, SamplerKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Dataset;
use crate::errors::Result;
use crate::evaluation::{evaluate, feature_importance, FeatureImportance};
use crate::final_model::train_final;
use crate::matrix::{build_matrix, TypedMatrix};
use crate::search::{tune, RandomSampler, Sampler, TpeSampler, TrialRecord, TuningInputs};
use crate::split::{time_ordered_split, SignupPeriod, UserSplit};
use crate::trainer::BoosterTrainer;
use crate::weights::compute_scale_pos_weight;

/// Cohort sizes of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_users: usize,
    pub val_users: usize,
    pub test_users: usize,
    pub train_rows: usize,
    pub val_rows: usize,
    pub test_rows: usize,
    pub train_period: Option<SignupPeriod>,
    pub val_period: Option<SignupPeriod>,
    pub test_period: Option<SignupPeriod>,
}

impl From<&UserSplit> for SplitSummary {
    fn from(split: &UserSplit) -> Self {
        let (train_rows, val_rows, test_rows) = split.row_counts();
        Self {
            train_users: split.train_users.len(),
            val_users: split.val_users.len(),
            test_users: split.test_users.len(),
            train_rows,
            val_rows,
            test_rows,
            train_period: split.train_period,
            val_period: split.val_period,
            test_period: split.test_period,
        }
    }
}

/// Everything a run produces
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub model: GbdtModel,
    pub metrics: MetricsRecord,
    /// Sampled values of the winning trial
    pub best_params: ParamMap,
    /// Validation average precision of the winning trial
    pub best_score: f64,
    pub trials: Vec<TrialRecord>,
    pub importance: Vec<FeatureImportance>,
    pub scale_pos_weight: f64,
    pub split: SplitSummary,
}

/// Search strategy selected by `model.sampler`
pub fn make_sampler(kind: SamplerKind) -> Box<dyn Sampler> {
    match kind {
        SamplerKind::Tpe => Box::new(TpeSampler::new()),
        SamplerKind::Random => Box::new(RandomSampler::new()),
    }
}

/// Run every stage on `dataset` with `trainer`
pub fn run_pipeline(
    config: &PipelineConfig,
    dataset: &Dataset,
    trainer: &dyn BoosterTrainer,
) -> Result<PipelineOutput> {
    config.validate()?;
    let positives = dataset.labels().iter().filter(|&&label| label == 1).count();
    info!(
        "Running pipeline on {} records from {} users ({} churned records)",
        dataset.len(),
        dataset.user_count(),
        positives
    );

    let split = time_ordered_split(&dataset.records, config.data.test_frac, config.data.val_frac)?;
    let train = partition_matrix(dataset, &split.train_mask, config)?;
    let val = partition_matrix(dataset, &split.val_mask, config)?;
    let test = partition_matrix(dataset, &split.test_mask, config)?;

    let scale_pos_weight = compute_scale_pos_weight(&train.labels);

    let mut sampler = make_sampler(config.model.sampler);
    let inputs = TuningInputs {
        train: &train,
        val: &val,
        scale_pos_weight,
    };
    let outcome = tune(trainer, sampler.as_mut(), &inputs, config)?;
    info!(
        "Search finished: best trial {} of {} ({} failed), average precision {:.5}",
        outcome.best_trial,
        outcome.trials.len(),
        outcome.failed_trials(),
        outcome.best_score
    );

    let model = train_final(trainer, &train, &val, &outcome.best_params, scale_pos_weight, config)?;
    let metrics = evaluate(&model, &val, &test, &config.evaluation.top_k)?;
    let importance = feature_importance(&model);

    Ok(PipelineOutput {
        model,
        metrics,
        best_params: outcome.best_params,
        best_score: outcome.best_score,
        trials: outcome.trials,
        importance,
        scale_pos_weight,
        split: SplitSummary::from(&split),
    })
}

fn partition_matrix(dataset: &Dataset, mask: &[bool], config: &PipelineConfig) -> Result<TypedMatrix> {
    let (rows, labels) = dataset.select(mask);
    build_matrix(
        rows,
        labels,
        &dataset.feature_names,
        &config.features.numeric,
        &config.features.categorical,
    )
}
