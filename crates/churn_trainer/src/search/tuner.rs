//! Trial loop
//!
//! Each trial merges `fixed_params` ← `seed` ← `scale_pos_weight` ← sampled
//! values, trains with early stopping on the validation matrix and scores the
//! validation predictions (truncated at the best round) by average precision.
//! A failing trial is logged and scored `-inf`; only a run where every trial
//! fails is an error.

use churn_core::metrics::average_precision;
use churn_core::params::format_params;
use churn_core::{ChurnError, ParamMap, ParamValue, PipelineConfig};
use tracing::{info, warn};

use super::sampler::Sampler;
use super::{TrialRecord, TrialState};
use crate::deterministic::stream_rng;
use crate::errors::{Result, TrainerError};
use crate::matrix::TypedMatrix;
use crate::params::BoostParams;
use crate::trainer::{BoostSchedule, BoosterTrainer, EvalSet};

/// Matrices and class weight shared by every trial
#[derive(Clone, Copy, Debug)]
pub struct TuningInputs<'a> {
    pub train: &'a TypedMatrix,
    pub val: &'a TypedMatrix,
    pub scale_pos_weight: f64,
}

/// Result of a completed search
#[derive(Clone, Debug)]
pub struct TuningOutcome {
    /// Sampled values of the best trial
    pub best_params: ParamMap,
    pub best_score: f64,
    pub best_trial: usize,
    pub trials: Vec<TrialRecord>,
}

impl TuningOutcome {
    pub fn failed_trials(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_complete()).count()
    }
}

/// Parameters every trial starts from: fixed params, then seed and class weight
pub fn base_trial_params(config: &PipelineConfig, scale_pos_weight: f64) -> ParamMap {
    let mut params = config.model.fixed_params.clone();
    params.insert("seed".to_string(), ParamValue::Int(config.data.random_state as i64));
    params.insert("scale_pos_weight".to_string(), ParamValue::Float(scale_pos_weight));
    params
}

/// Run `model.n_trials` trials and return the best-scoring assignment
pub fn tune(
    trainer: &dyn BoosterTrainer,
    sampler: &mut dyn Sampler,
    inputs: &TuningInputs<'_>,
    config: &PipelineConfig,
) -> Result<TuningOutcome> {
    let model_config = &config.model;
    model_config.validate()?;

    let base = base_trial_params(config, inputs.scale_pos_weight);
    BoostParams::from_params(&base)?;
    check_two_classes(&inputs.val.labels)?;

    let schedule = BoostSchedule::new(model_config.num_boost_round)
        .with_early_stopping(model_config.early_stopping_rounds);
    let space = &model_config.hyperparameter_ranges;

    info!(
        "Starting {} search: {} trials over {} parameters",
        sampler.name(),
        model_config.n_trials,
        space.len()
    );

    let mut trials = Vec::with_capacity(model_config.n_trials);
    for number in 0..model_config.n_trials {
        let mut rng = stream_rng(config.data.random_state, number as u64);
        let sampled = sampler.propose(space, &mut rng);

        let mut params = base.clone();
        params.extend(sampled.iter().map(|(k, v)| (k.clone(), v.clone())));

        let record = match run_trial(trainer, inputs, &params, &schedule) {
            Ok((score, best_iteration)) if score.is_finite() => {
                info!(
                    trial = number,
                    score,
                    "Trial {} complete: average precision {:.5} (best round {:?}) [{}]",
                    number,
                    score,
                    best_iteration,
                    format_params(&sampled)
                );
                TrialRecord {
                    number,
                    params: sampled,
                    score,
                    state: TrialState::Complete,
                    best_iteration,
                }
            }
            outcome => {
                let reason = match outcome {
                    Ok((score, _)) => format!("non-finite score {score}"),
                    Err(e) => e.to_string(),
                };
                warn!(trial = number, "Trial {} failed: {} [{}]", number, reason, format_params(&sampled));
                TrialRecord {
                    number,
                    params: sampled,
                    score: f64::NEG_INFINITY,
                    state: TrialState::Failed,
                    best_iteration: None,
                }
            }
        };

        sampler.observe(&record);
        trials.push(record);
    }

    let best = trials
        .iter()
        .filter(|t| t.is_complete())
        .fold(None::<&TrialRecord>, |best, t| match best {
            Some(b) if t.score <= b.score => Some(b),
            _ => Some(t),
        })
        .ok_or(TrainerError::AllTrialsFailed {
            n_trials: model_config.n_trials,
        })?;

    info!(
        "Best trial {}: average precision {:.5} [{}]",
        best.number,
        best.score,
        format_params(&best.params)
    );

    let (best_params, best_score, best_trial) = (best.params.clone(), best.score, best.number);
    Ok(TuningOutcome {
        best_params,
        best_score,
        best_trial,
        trials,
    })
}

fn run_trial(
    trainer: &dyn BoosterTrainer,
    inputs: &TuningInputs<'_>,
    params: &ParamMap,
    schedule: &BoostSchedule,
) -> Result<(f64, Option<usize>)> {
    let evals = [EvalSet::new("val", inputs.val)];
    let model = trainer.train(inputs.train, &evals, params, schedule)?;
    let probabilities = model.predict_proba_rows(&inputs.val.rows);
    let score = average_precision(&inputs.val.labels, &probabilities)?;
    Ok((score, model.best_iteration))
}

fn check_two_classes(labels: &[u8]) -> Result<()> {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == labels.len() {
        return Err(ChurnError::data(format!(
            "validation partition needs both classes to score trials ({} rows, {} positive)",
            labels.len(),
            positives
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{RandomSampler, TpeConfig, TpeSampler};
    use crate::trainer::GbdtTrainer;
    use churn_core::config::{
        DataConfig, EvaluationConfig, FeaturesConfig, ModelConfig, ParamRange, SamplerKind,
    };
    use churn_core::{FeatureType, GbdtModel};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn matrix(n: usize, offset: usize) -> TypedMatrix {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in offset..offset + n {
            let tenure = ((i * 37) % 50) as f64;
            let spend = ((i * 13) % 23) as f64;
            rows.push(vec![tenure, spend]);
            labels.push(u8::from(tenure < 12.0 || spend > 20.0));
        }
        TypedMatrix {
            rows,
            labels,
            feature_names: vec!["tenure".into(), "spend".into()],
            feature_types: vec![FeatureType::Numeric, FeatureType::Numeric],
        }
    }

    fn config(n_trials: usize) -> PipelineConfig {
        let mut ranges = BTreeMap::new();
        ranges.insert("max_depth".to_string(), ParamRange::int(2, 4));
        ranges.insert("eta".to_string(), ParamRange::log_float(0.05, 0.5));
        ranges.insert("subsample".to_string(), ParamRange::float(0.6, 1.0));

        let mut fixed = ParamMap::new();
        fixed.insert("eval_metric".to_string(), ParamValue::from("aucpr"));

        PipelineConfig {
            data: DataConfig {
                test_frac: 0.2,
                val_frac: 0.1,
                random_state: 42,
                user_column: "user_id".into(),
                timestamp_column: "payment_date".into(),
                label_column: "is_churn".into(),
            },
            features: FeaturesConfig {
                numeric: vec!["tenure".into(), "spend".into()],
                categorical: vec![],
                all_features: None,
            },
            model: ModelConfig {
                n_trials,
                num_boost_round: 30,
                early_stopping_rounds: 5,
                fixed_params: fixed,
                hyperparameter_ranges: ranges,
                sampler: SamplerKind::Tpe,
                verbose_eval: 0,
            },
            evaluation: EvaluationConfig::default(),
        }
    }

    /// Fails every trial whose sampled depth is odd
    struct FlakyTrainer {
        calls: AtomicUsize,
    }

    impl BoosterTrainer for FlakyTrainer {
        fn train(
            &self,
            train: &TypedMatrix,
            evals: &[EvalSet<'_>],
            params: &ParamMap,
            schedule: &BoostSchedule,
        ) -> Result<GbdtModel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if params["max_depth"].as_i64().unwrap_or(0) % 2 == 1 {
                return Err(TrainerError::Training("injected failure".into()));
            }
            GbdtTrainer::new().train(train, evals, params, schedule)
        }
    }

    struct AlwaysFails;

    impl BoosterTrainer for AlwaysFails {
        fn train(&self, _: &TypedMatrix, _: &[EvalSet<'_>], _: &ParamMap, _: &BoostSchedule) -> Result<GbdtModel> {
            Err(TrainerError::Training("diverged".into()))
        }
    }

    #[test]
    fn test_best_params_lie_inside_space() -> Result<()> {
        let (train, val) = (matrix(200, 0), matrix(80, 1000));
        let config = config(6);
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 2.0,
        };
        let outcome = tune(&GbdtTrainer::new(), &mut RandomSampler::new(), &inputs, &config)?;

        assert_eq!(outcome.trials.len(), 6);
        assert_eq!(outcome.best_params.len(), 3);
        let depth = outcome.best_params["max_depth"].as_i64().unwrap();
        assert!((2..=4).contains(&depth));
        let eta = outcome.best_params["eta"].as_f64().unwrap();
        assert!((0.05..=0.5).contains(&eta));
        assert!(outcome.best_score > 0.0 && outcome.best_score <= 1.0);
        assert!(outcome.trials.iter().all(|t| t.score <= outcome.best_score));
        Ok(())
    }

    #[test]
    fn test_identical_seeds_give_identical_results() -> Result<()> {
        let (train, val) = (matrix(150, 0), matrix(60, 500));
        let config = config(5);
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 1.0,
        };
        let tpe = || {
            TpeSampler::with_config(TpeConfig {
                n_startup_trials: 2,
                ..TpeConfig::default()
            })
        };

        let a = tune(&GbdtTrainer::new(), &mut tpe(), &inputs, &config)?;
        let b = tune(&GbdtTrainer::new(), &mut tpe(), &inputs, &config)?;
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score, b.best_score);
        assert_eq!(a.trials, b.trials);
        Ok(())
    }

    #[test]
    fn test_failing_trials_are_absorbed() -> Result<()> {
        let (train, val) = (matrix(120, 0), matrix(60, 700));
        let config = config(12);
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 1.0,
        };
        let trainer = FlakyTrainer {
            calls: AtomicUsize::new(0),
        };
        let outcome = tune(&trainer, &mut RandomSampler::new(), &inputs, &config)?;

        assert_eq!(trainer.calls.load(Ordering::SeqCst), 12);
        assert!(outcome.failed_trials() > 0);
        assert!(outcome.best_params["max_depth"].as_i64().unwrap() % 2 == 0);
        for trial in outcome.trials.iter().filter(|t| !t.is_complete()) {
            assert_eq!(trial.score, f64::NEG_INFINITY);
        }
        Ok(())
    }

    #[test]
    fn test_all_failing_trials_are_fatal() {
        let (train, val) = (matrix(50, 0), matrix(30, 100));
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 1.0,
        };
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &config(3)).unwrap_err();
        assert!(matches!(err, TrainerError::AllTrialsFailed { n_trials: 3 }));
    }

    #[test]
    fn test_configuration_errors_before_training() {
        let (train, val) = (matrix(50, 0), matrix(30, 100));
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 1.0,
        };

        let mut zero_trials = config(0);
        zero_trials.model.n_trials = 0;
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &zero_trials).unwrap_err();
        assert!(err.is_configuration());

        let mut empty_space = config(3);
        empty_space.model.hyperparameter_ranges.clear();
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &empty_space).unwrap_err();
        assert!(err.is_configuration());

        let mut inverted = config(3);
        inverted
            .model
            .hyperparameter_ranges
            .insert("gamma".to_string(), ParamRange::float(2.0, 1.0));
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &inverted).unwrap_err();
        assert!(err.is_configuration());

        let mut bad_fixed = config(3);
        bad_fixed
            .model
            .fixed_params
            .insert("subsample".to_string(), ParamValue::Float(0.0));
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &bad_fixed).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_one_class_validation_is_rejected() {
        let train = matrix(50, 0);
        let mut val = matrix(30, 100);
        val.labels = vec![0; 30];
        let inputs = TuningInputs {
            train: &train,
            val: &val,
            scale_pos_weight: 1.0,
        };
        let err = tune(&AlwaysFails, &mut RandomSampler::new(), &inputs, &config(2)).unwrap_err();
        assert!(err.to_string().contains("both classes"));
    }
}
