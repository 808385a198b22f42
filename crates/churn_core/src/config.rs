//! Pipeline configuration
//!
//! The configuration is loaded once, validated, and then passed by reference
//! into every stage of the pipeline. Nothing reloads it behind the caller's back.

use crate::errors::{ChurnError, Result};
use crate::params::ParamMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

/// Complete churn training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Cohort split and reproducibility settings
    pub data: DataConfig,
    /// Feature column declarations
    pub features: FeaturesConfig,
    /// Search budget, boosting schedule and parameter space
    pub model: ModelConfig,
    /// Evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Cohort split configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Fraction of users (latest signups) held out for testing
    pub test_frac: f64,
    /// Fraction of users held out for validation
    pub val_frac: f64,
    /// Master seed for sampling and training
    #[serde(default)]
    pub random_state: u64,
    #[serde(default = "default_user_column")]
    pub user_column: String,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

/// Feature declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub numeric: Vec<String>,
    #[serde(default)]
    pub categorical: Vec<String>,
    /// Explicit column order; defaults to numeric followed by categorical
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_features: Option<Vec<String>>,
}

/// Model search and training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of search trials
    pub n_trials: usize,
    /// Maximum boosting rounds per training run
    pub num_boost_round: usize,
    /// Rounds without validation improvement before stopping
    pub early_stopping_rounds: usize,
    /// Parameters passed verbatim to every trial
    #[serde(default)]
    pub fixed_params: ParamMap,
    /// Searchable parameters
    #[serde(default)]
    pub hyperparameter_ranges: BTreeMap<String, ParamRange>,
    #[serde(default)]
    pub sampler: SamplerKind,
    /// Log the eval curves every N rounds during final training (0 disables)
    #[serde(default = "default_verbose_eval")]
    pub verbose_eval: usize,
}

/// Search range of a single hyperparameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParamRange {
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    /// Sample uniformly in log space
    #[serde(default)]
    pub log: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    #[default]
    Float,
}

/// Search strategy used to propose trial assignments
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Tree-structured Parzen estimator
    #[default]
    Tpe,
    Random,
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Fractions used for precision-at-top-k
    #[serde(default = "default_top_k")]
    pub top_k: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_user_column() -> String {
    "user_id".to_string()
}

fn default_timestamp_column() -> String {
    "payment_date".to_string()
}

fn default_label_column() -> String {
    "is_churn".to_string()
}

fn default_verbose_eval() -> usize {
    20
}

fn default_top_k() -> Vec<f64> {
    vec![0.05, 0.10]
}

impl PipelineConfig {
    /// Load and validate a configuration file (YAML or TOML by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            other => {
                return Err(ChurnError::config(
                    "config",
                    format!("unsupported configuration format: {:?}", other),
                ))
            }
        };

        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section; the first violation is reported
    pub fn validate(&self) -> Result<()> {
        validate_split_fractions(self.data.test_frac, self.data.val_frac)?;
        self.features.validate()?;
        self.model.validate()?;
        self.evaluation.validate()?;
        Ok(())
    }
}

impl FeaturesConfig {
    /// Ordered feature columns used to build every matrix
    pub fn all_features(&self) -> Vec<String> {
        match &self.all_features {
            Some(all) => all.clone(),
            None => self
                .numeric
                .iter()
                .chain(self.categorical.iter())
                .cloned()
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let all = self.all_features();
        if all.is_empty() {
            return Err(ChurnError::config(
                "features.all_features",
                "at least one feature column is required",
            ));
        }

        let mut seen = HashSet::new();
        for name in &all {
            if !seen.insert(name.as_str()) {
                return Err(ChurnError::config(
                    "features.all_features",
                    format!("feature `{name}` is declared more than once"),
                ));
            }
        }

        let numeric: HashSet<&str> = self.numeric.iter().map(String::as_str).collect();
        let categorical: HashSet<&str> = self.categorical.iter().map(String::as_str).collect();

        for name in &all {
            match (numeric.contains(name.as_str()), categorical.contains(name.as_str())) {
                (true, true) => {
                    return Err(ChurnError::config(
                        "features",
                        format!("feature `{name}` is both numeric and categorical"),
                    ))
                }
                (false, false) => {
                    return Err(ChurnError::config(
                        "features",
                        format!("feature `{name}` is neither numeric nor categorical"),
                    ))
                }
                _ => {}
            }
        }

        for name in self.numeric.iter().chain(self.categorical.iter()) {
            if !seen.contains(name.as_str()) {
                return Err(ChurnError::config(
                    "features.all_features",
                    format!("typed feature `{name}` is missing from all_features"),
                ));
            }
        }

        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(ChurnError::config("model.n_trials", "must be greater than 0"));
        }
        if self.num_boost_round == 0 {
            return Err(ChurnError::config(
                "model.num_boost_round",
                "must be greater than 0",
            ));
        }
        if self.early_stopping_rounds == 0 {
            return Err(ChurnError::config(
                "model.early_stopping_rounds",
                "must be greater than 0",
            ));
        }
        if self.hyperparameter_ranges.is_empty() {
            return Err(ChurnError::config(
                "model.hyperparameter_ranges",
                format!("search space is empty but n_trials is {}", self.n_trials),
            ));
        }
        for (name, range) in &self.hyperparameter_ranges {
            range.validate(name)?;
        }
        Ok(())
    }
}

impl ParamRange {
    pub fn int(min: i64, max: i64) -> Self {
        Self {
            kind: ParamKind::Int,
            min: min as f64,
            max: max as f64,
            log: false,
        }
    }

    pub fn float(min: f64, max: f64) -> Self {
        Self {
            kind: ParamKind::Float,
            min,
            max,
            log: false,
        }
    }

    pub fn log_float(min: f64, max: f64) -> Self {
        Self {
            log: true,
            ..Self::float(min, max)
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let field = format!("model.hyperparameter_ranges.{name}");
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ChurnError::config(field, "bounds must be finite"));
        }
        if self.min > self.max {
            return Err(ChurnError::config(
                field,
                format!("min ({}) is greater than max ({})", self.min, self.max),
            ));
        }
        if self.log && self.min <= 0.0 {
            return Err(ChurnError::config(
                field,
                format!("log-scale range needs a positive min, got {}", self.min),
            ));
        }
        if self.kind == ParamKind::Int && self.min.ceil() > self.max.floor() {
            return Err(ChurnError::config(field, "integer range contains no integers"));
        }
        Ok(())
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k.is_empty() {
            return Err(ChurnError::config(
                "evaluation.top_k",
                "at least one k value is required",
            ));
        }
        for &k in &self.top_k {
            validate_top_k(k)?;
        }
        Ok(())
    }
}

/// Check cohort fractions: each in `[0, 1]` and together at most 1
pub fn validate_split_fractions(test_frac: f64, val_frac: f64) -> Result<()> {
    for (field, value) in [("data.test_frac", test_frac), ("data.val_frac", val_frac)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ChurnError::config(
                field,
                format!("must lie in [0, 1], got {value}"),
            ));
        }
    }
    if test_frac + val_frac > 1.0 {
        return Err(ChurnError::config(
            "data",
            format!("test_frac ({test_frac}) + val_frac ({val_frac}) exceeds 1.0"),
        ));
    }
    Ok(())
}

/// Check a precision-at-k fraction lies in `(0, 1]`
pub fn validate_top_k(k: f64) -> Result<()> {
    if !(k > 0.0 && k <= 1.0) {
        return Err(ChurnError::config(
            "evaluation.top_k",
            format!("k must lie in (0, 1], got {k}"),
        ));
    }
    Ok(())
}
