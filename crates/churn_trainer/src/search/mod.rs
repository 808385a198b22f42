//! Hyperparameter search
//!
//! - `sampler`: the [`Sampler`] seam and seeded random search
//! - `tpe`: tree-structured Parzen estimator
//! - `tuner`: the trial loop scoring each assignment by validation average precision

pub mod sampler;
pub mod tpe;
pub mod tuner;

use churn_core::ParamMap;

pub use sampler::{sample_uniform, RandomSampler, Sampler, SearchSpace};
pub use tpe::{TpeConfig, TpeSampler};
pub use tuner::{tune, TuningInputs, TuningOutcome};

/// Outcome of a single trial
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialState {
    Complete,
    Failed,
}

/// One evaluated assignment of the search space
#[derive(Clone, Debug, PartialEq)]
pub struct TrialRecord {
    pub number: usize,
    /// Sampled values only; fixed parameters are not repeated here
    pub params: ParamMap,
    /// Validation average precision, `-inf` for failed trials
    pub score: f64,
    pub state: TrialState,
    pub best_iteration: Option<usize>,
}

impl TrialRecord {
    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }
}
