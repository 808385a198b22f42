//! Production retraining with the winning search assignment

use churn_core::params::format_params;
use churn_core::{GbdtModel, ParamMap, ParamValue, PipelineConfig};
use tracing::{info, warn};

use crate::errors::Result;
use crate::matrix::TypedMatrix;
use crate::trainer::{BoostSchedule, BoosterTrainer, EvalSet};

/// Parameters pinned for the production model
pub fn production_params(seed: u64, scale_pos_weight: f64) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("objective".to_string(), ParamValue::from("binary:logistic"));
    params.insert("eval_metric".to_string(), ParamValue::from("aucpr"));
    params.insert("seed".to_string(), ParamValue::Int(seed as i64));
    params.insert("scale_pos_weight".to_string(), ParamValue::Float(scale_pos_weight));
    params.insert("tree_method".to_string(), ParamValue::from("hist"));
    params.insert("max_cat_to_onehot".to_string(), ParamValue::Int(4));
    params
}

/// Merge `fixed_params` < production params < `best_params`
pub fn final_params(config: &PipelineConfig, best_params: &ParamMap, scale_pos_weight: f64) -> ParamMap {
    let mut params = config.model.fixed_params.clone();
    params.extend(production_params(config.data.random_state, scale_pos_weight));
    params.extend(best_params.iter().map(|(k, v)| (k.clone(), v.clone())));
    params
}

/// Retrain on `train`, tracking train and validation curves
///
/// Early stopping watches the validation set (the last eval set); the returned
/// model predicts with the trees up to its best iteration.
pub fn train_final(
    trainer: &dyn BoosterTrainer,
    train: &TypedMatrix,
    val: &TypedMatrix,
    best_params: &ParamMap,
    scale_pos_weight: f64,
    config: &PipelineConfig,
) -> Result<GbdtModel> {
    let params = final_params(config, best_params, scale_pos_weight);
    info!("Training final model with {}", format_params(&params));

    let schedule = BoostSchedule::new(config.model.num_boost_round)
        .with_early_stopping(config.model.early_stopping_rounds)
        .with_verbose_eval(config.model.verbose_eval);
    let evals = [EvalSet::new("train", train), EvalSet::new("val", val)];

    let model = trainer.train(train, &evals, &params, &schedule)?;

    info!(
        best_iteration = ?model.best_iteration,
        best_score = ?model.best_score,
        "Final model trained: {} trees, scoring with {}",
        model.num_trees(),
        model.scoring_trees()
    );
    if rounds_exhausted(&model) {
        warn!(
            "Final model did not converge: {} rounds exhausted before early stopping (best iteration {:?})",
            config.model.num_boost_round,
            model.best_iteration
        );
    }
    Ok(model)
}

/// Early stopping was armed but never triggered
fn rounds_exhausted(model: &GbdtModel) -> bool {
    model.best_iteration.is_some() && !model.history.stopped_early
}
