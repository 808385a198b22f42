//! Booster parameter interpretation
//!
//! Accepts the xgboost-compatible names used in configuration files
//! (`eta` / `learning_rate`, `lambda` / `reg_lambda`, ...) and resolves them
//! into a typed [`BoostParams`]. Unknown names are logged and ignored.

use churn_core::metrics::{average_precision, error_rate, log_loss, roc_auc};
use churn_core::{ChurnError, ParamMap, ParamValue};
use std::fmt;
use tracing::warn;

use crate::errors::Result;

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    BinaryLogistic,
}

impl Objective {
    pub fn name(&self) -> &'static str {
        match self {
            Objective::BinaryLogistic => "binary:logistic",
        }
    }
}

/// Metric monitored on eval sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMetric {
    LogLoss,
    AucPr,
    Auc,
    Error,
}

impl EvalMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "logloss" => Some(EvalMetric::LogLoss),
            "aucpr" => Some(EvalMetric::AucPr),
            "auc" => Some(EvalMetric::Auc),
            "error" => Some(EvalMetric::Error),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvalMetric::LogLoss => "logloss",
            EvalMetric::AucPr => "aucpr",
            EvalMetric::Auc => "auc",
            EvalMetric::Error => "error",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, EvalMetric::AucPr | EvalMetric::Auc)
    }

    /// Score probabilities against labels
    pub fn evaluate(&self, labels: &[u8], probabilities: &[f64]) -> Result<f64> {
        let value = match self {
            EvalMetric::LogLoss => log_loss(labels, probabilities)?,
            EvalMetric::AucPr => average_precision(labels, probabilities)?,
            EvalMetric::Auc => roc_auc(labels, probabilities)?,
            EvalMetric::Error => error_rate(labels, probabilities)?,
        };
        Ok(value)
    }
}

impl fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved booster parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BoostParams {
    pub objective: Objective,
    pub eval_metric: EvalMetric,
    pub eta: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub scale_pos_weight: f64,
    pub seed: u64,
    pub max_bin: usize,
    pub max_cat_to_onehot: usize,
    /// Initial prediction in probability space; `None` uses the weighted label mean
    pub base_score: Option<f64>,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            objective: Objective::BinaryLogistic,
            eval_metric: EvalMetric::LogLoss,
            eta: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            lambda: 1.0,
            alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            scale_pos_weight: 1.0,
            seed: 0,
            max_bin: 256,
            max_cat_to_onehot: 4,
            base_score: None,
        }
    }
}

impl BoostParams {
    /// Resolve a loosely typed parameter map
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let mut resolved = Self::default();

        for (name, value) in params {
            match name.as_str() {
                "objective" => {
                    resolved.objective = match string(name, value)? {
                        "binary:logistic" => Objective::BinaryLogistic,
                        other => return Err(invalid(name, format!("unsupported objective `{other}`"))),
                    }
                }
                "eval_metric" => {
                    let metric = string(name, value)?;
                    resolved.eval_metric = EvalMetric::parse(metric)
                        .ok_or_else(|| invalid(name, format!("unsupported metric `{metric}`")))?;
                }
                "tree_method" => match string(name, value)? {
                    "hist" | "auto" | "approx" => {}
                    other => return Err(invalid(name, format!("unsupported tree method `{other}`"))),
                },
                "eta" | "learning_rate" => resolved.eta = number(name, value)?,
                "max_depth" => resolved.max_depth = count(name, value)?,
                "min_child_weight" => resolved.min_child_weight = number(name, value)?,
                "lambda" | "reg_lambda" => resolved.lambda = number(name, value)?,
                "alpha" | "reg_alpha" => resolved.alpha = number(name, value)?,
                "gamma" | "min_split_loss" => resolved.gamma = number(name, value)?,
                "subsample" => resolved.subsample = number(name, value)?,
                "colsample_bytree" => resolved.colsample_bytree = number(name, value)?,
                "scale_pos_weight" => resolved.scale_pos_weight = number(name, value)?,
                "seed" | "random_state" => {
                    let seed = value
                        .as_i64()
                        .filter(|s| *s >= 0)
                        .ok_or_else(|| invalid(name, format!("expected a non-negative integer, got {value}")))?;
                    resolved.seed = seed as u64;
                }
                "max_bin" => resolved.max_bin = count(name, value)?,
                "max_cat_to_onehot" => resolved.max_cat_to_onehot = count(name, value)?,
                "base_score" => resolved.base_score = Some(number(name, value)?),
                "verbosity" | "nthread" | "n_jobs" => {}
                _ => warn!("Ignoring unknown booster parameter `{}` = {}", name, value),
            }
        }

        resolved.validate()?;
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool, &str); 10] = [
            ("eta", self.eta > 0.0 && self.eta.is_finite(), "must be positive"),
            ("max_depth", self.max_depth >= 1, "must be at least 1"),
            ("min_child_weight", self.min_child_weight >= 0.0 && self.min_child_weight.is_finite(), "must be non-negative"),
            ("lambda", self.lambda >= 0.0 && self.lambda.is_finite(), "must be non-negative"),
            ("alpha", self.alpha >= 0.0 && self.alpha.is_finite(), "must be non-negative"),
            ("gamma", self.gamma >= 0.0 && self.gamma.is_finite(), "must be non-negative"),
            ("subsample", self.subsample > 0.0 && self.subsample <= 1.0, "must lie in (0, 1]"),
            ("colsample_bytree", self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0, "must lie in (0, 1]"),
            ("scale_pos_weight", self.scale_pos_weight >= 0.0 && self.scale_pos_weight.is_finite(), "must be non-negative"),
            ("max_bin", self.max_bin >= 2, "must be at least 2"),
        ];
        for (name, ok, message) in checks {
            if !ok {
                return Err(invalid(name, message.to_string()));
            }
        }

        if let Some(base) = self.base_score {
            if !(base > 0.0 && base < 1.0) {
                return Err(invalid("base_score", format!("must lie in (0, 1), got {base}")));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, message: String) -> crate::errors::TrainerError {
    ChurnError::config(format!("params.{name}"), message).into()
}

fn number(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| invalid(name, format!("expected a number, got {value}")))
}

fn count(name: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_i64()
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| invalid(name, format!("expected a non-negative integer, got {value}")))
}

fn string<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(name, format!("expected a string, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let resolved = BoostParams::from_params(&ParamMap::new())?;
        assert_eq!(resolved, BoostParams::default());
        assert_eq!(resolved.objective.name(), "binary:logistic");
        Ok(())
    }

    #[test]
    fn test_aliases_resolve() -> Result<()> {
        let resolved = BoostParams::from_params(&params(&[
            ("learning_rate", ParamValue::Float(0.05)),
            ("reg_lambda", ParamValue::Float(2.0)),
            ("reg_alpha", ParamValue::Int(1)),
            ("min_split_loss", ParamValue::Float(0.5)),
            ("random_state", ParamValue::Int(42)),
            ("max_depth", ParamValue::Float(4.0)),
            ("eval_metric", "aucpr".into()),
            ("tree_method", "hist".into()),
            ("nthread", ParamValue::Int(8)),
        ]))?;

        assert_eq!(resolved.eta, 0.05);
        assert_eq!(resolved.lambda, 2.0);
        assert_eq!(resolved.alpha, 1.0);
        assert_eq!(resolved.gamma, 0.5);
        assert_eq!(resolved.seed, 42);
        assert_eq!(resolved.max_depth, 4);
        assert_eq!(resolved.eval_metric, EvalMetric::AucPr);
        Ok(())
    }

    #[test]
    fn test_unknown_names_ignored() -> Result<()> {
        let resolved = BoostParams::from_params(&params(&[("grow_policy", "lossguide".into())]))?;
        assert_eq!(resolved, BoostParams::default());
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for bad in [
            params(&[("subsample", ParamValue::Float(0.0))]),
            params(&[("subsample", ParamValue::Float(1.5))]),
            params(&[("max_depth", ParamValue::Int(0))]),
            params(&[("max_depth", ParamValue::Float(2.5))]),
            params(&[("eta", ParamValue::Int(-1))]),
            params(&[("objective", "reg:squarederror".into())]),
            params(&[("eval_metric", "rmse".into())]),
            params(&[("tree_method", "exact".into())]),
            params(&[("lambda", "high".into())]),
            params(&[("base_score", ParamValue::Float(1.0))]),
        ] {
            let err = BoostParams::from_params(&bad).unwrap_err();
            assert!(err.is_configuration(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_metric_directions() {
        assert!(EvalMetric::AucPr.higher_is_better());
        assert!(EvalMetric::Auc.higher_is_better());
        assert!(!EvalMetric::LogLoss.higher_is_better());
        assert!(!EvalMetric::Error.higher_is_better());
        assert_eq!(EvalMetric::parse("aucpr"), Some(EvalMetric::AucPr));
        assert_eq!(EvalMetric::AucPr.to_string(), "aucpr");
    }

    #[test]
    fn test_metric_evaluation() -> Result<()> {
        let labels = [0, 0, 1, 1];
        let probs = [0.1, 0.4, 0.35, 0.8];
        assert_eq!(EvalMetric::Auc.evaluate(&labels, &probs)?, 0.75);
        assert_eq!(EvalMetric::Error.evaluate(&labels, &probs)?, 0.25);
        assert!(EvalMetric::AucPr.evaluate(&[0, 0], &[0.1, 0.2]).is_err());
        Ok(())
    }
}
