//! Churn Core
//!
//! Shared building blocks for training and scoring binary churn classifiers.
//!
//! Modules:
//! - `config`: Pipeline configuration loading and validation
//! - `errors`: Error taxonomy shared by every stage
//! - `gbdt`: Boosted tree model representation and inference
//! - `metrics`: ROC-AUC, average precision and precision-at-k
//! - `params`: Loosely typed trainer parameters
//! - `serde_canon`: Canonical JSON and blake3 hashing for model packaging
//! - `types`: Feature type tags

pub mod config;
pub mod errors;
pub mod gbdt;
pub mod metrics;
pub mod params;
pub mod serde_canon;
pub mod types;

pub use config::{
    DataConfig, EvaluationConfig, FeaturesConfig, ModelConfig, ParamKind, ParamRange,
    PipelineConfig, SamplerKind,
};
pub use errors::{ChurnError, Result};
pub use gbdt::{EvalHistory, GbdtModel, Node, Tree};
pub use metrics::{average_precision, precision_at_k, roc_auc, MetricsRecord};
pub use params::{ParamMap, ParamValue};
pub use types::FeatureType;

/// Crate version string for model metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `floor(fraction * n)` clamped to `[0, n]`
///
/// No rounding is applied before flooring: `0.29 * 100.0` evaluates to
/// `28.999999999999996` and yields 28.
pub fn floor_fraction(fraction: f64, n: usize) -> usize {
    let product = fraction * n as f64;
    if product.is_nan() || product <= 0.0 {
        return 0;
    }
    (product.floor() as usize).min(n)
}
