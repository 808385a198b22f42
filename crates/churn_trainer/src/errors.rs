use churn_core::ChurnError;
use thiserror::Error;

/// Errors returned by the churn trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(transparent)]
    Core(#[from] ChurnError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("training error: {0}")]
    Training(String),

    #[error("all {n_trials} search trials failed")]
    AllTrialsFailed { n_trials: usize },
}

impl TrainerError {
    /// Whether the error stems from invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, TrainerError::Core(ChurnError::Configuration { .. }))
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
