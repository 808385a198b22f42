//! Churn Trainer - time-ordered churn model training and evaluation
//!
//! Splits an event panel into train / validation / test cohorts by user
//! signup time, searches booster hyperparameters by validation average
//! precision, retrains the winner and scores it on held-out users.

pub mod binning;
pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod early_stopping;
pub mod errors;
pub mod evaluation;
pub mod final_model;
pub mod matrix;
pub mod params;
pub mod pipeline;
pub mod search;
pub mod split;
pub mod trainer;
pub mod weights;

use churn_core::PipelineConfig;
use std::path::Path;

pub use dataset::{Dataset, Record};
pub use deterministic::{derive_seed, stream_rng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use evaluation::{evaluate, feature_importance, FeatureImportance};
pub use final_model::{production_params, train_final};
pub use matrix::{build_matrix, TypedMatrix};
pub use params::{BoostParams, EvalMetric, Objective};
pub use pipeline::{make_sampler, run_pipeline, PipelineOutput, SplitSummary};
pub use search::{tune, RandomSampler, Sampler, TpeSampler, TrialRecord, TrialState, TuningInputs, TuningOutcome};
pub use split::{time_ordered_split, SignupPeriod, UserSplit};
pub use trainer::{BoostSchedule, BoosterTrainer, EvalSet, GbdtTrainer};
pub use weights::compute_scale_pos_weight;

/// Load a CSV panel and run the full pipeline with the built-in booster
pub fn train_from_csv(path: &Path, config: &PipelineConfig) -> Result<PipelineOutput> {
    let dataset = Dataset::from_csv(path, config)?;
    run_pipeline(config, &dataset, &GbdtTrainer::new())
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
