//! Churn Trainer CLI
//!
//! Loads a configuration and an event panel, runs the training pipeline and
//! writes the packaged model next to its metrics and winning parameters.

use anyhow::{Context, Result};
use churn_core::serde_canon::to_canonical_json;
use churn_core::PipelineConfig;
use churn_trainer::{run_pipeline, Dataset, GbdtTrainer};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "churn-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and evaluate a churn classifier on time-ordered user cohorts", long_about = None)]
struct Args {
    /// Pipeline configuration (YAML or TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Input CSV event panel with a header row
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for model, hash, metrics and parameters
    #[arg(short, long, default_value = "models/churn")]
    output: PathBuf,

    /// Override `model.n_trials`
    #[arg(long)]
    n_trials: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Churn Trainer v{}", churn_trainer::VERSION);

    let mut config = PipelineConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    if let Some(n_trials) = args.n_trials {
        config.model.n_trials = n_trials;
    }

    info!("Loading dataset from: {}", args.input.display());
    let dataset = Dataset::from_csv(&args.input, &config).context("Failed to load dataset")?;
    info!(
        "Loaded {} records from {} users with {} features",
        dataset.len(),
        dataset.user_count(),
        dataset.feature_names.len()
    );
    for (name, (min, max)) in dataset.feature_names.iter().zip(dataset.feature_stats()) {
        info!("  {}: min={}, max={}", name, min, max);
    }

    let output = run_pipeline(&config, &dataset, &GbdtTrainer::new()).context("Training pipeline failed")?;

    std::fs::create_dir_all(&args.output).context("Failed to create output directory")?;

    let model_json = output.model.to_canonical_json().context("Failed to serialize model")?;
    let model_path = args.output.join("model.json");
    write(&model_path, &model_json)?;

    let hash = output.model.hash_hex().context("Failed to hash model")?;
    let hash_path = args.output.join("model.hash");
    write(&hash_path, &hash)?;

    let metrics_json = serde_json::to_string_pretty(&output.metrics).context("Failed to serialize metrics")?;
    write(&args.output.join("metrics.json"), &metrics_json)?;

    let best = serde_json::json!({
        "best_params": output.best_params,
        "best_score": output.best_score,
        "scale_pos_weight": output.scale_pos_weight,
        "best_iteration": output.model.best_iteration,
        "split": output.split,
        "feature_importance": output.importance,
    });
    let best_json = to_canonical_json(&best).context("Failed to serialize best parameters")?;
    write(&args.output.join("best_params.json"), &best_json)?;

    info!("Training completed successfully");
    info!("  Model: {}", model_path.display());
    info!("  Hash: {} ({})", hash_path.display(), hash);
    for (name, value) in output.metrics.iter() {
        info!("  {}: {:.4}", name, value);
    }

    Ok(())
}

fn write(path: &Path, contents: &str) -> Result<()> {
    info!("Writing {}", path.display());
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
