//! Irrigation Advisor CLI
//!
//! A command-line tool for training, serving and monitoring the
//! irrigation model from local files.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{drift, model, predict};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Irrigation Advisor CLI
#[derive(Parser)]
#[command(name = "soilctl")]
#[command(author, version, about = "CLI for the Irrigation Advisor", long_about = None)]
pub struct Cli {
    /// Model store directory (can also be set via SOILCTL_MODEL_DIR env var)
    #[arg(long, env = "SOILCTL_MODEL_DIR", default_value = "models", global = true)]
    pub model_dir: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a new model version from sensor readings
    Train {
        /// JSON file of sensor readings
        #[arg(long)]
        readings: PathBuf,

        /// JSON file of historical weather
        #[arg(long)]
        weather: Option<PathBuf>,

        /// Days of history to train on
        #[arg(long, default_value_t = 30)]
        lookback_days: i64,

        /// Minimum number of collected records
        #[arg(long, default_value_t = 50)]
        min_samples: usize,
    },

    /// Predict irrigation need for one or more observations
    Predict {
        /// JSON file with an observation or a list of observations
        #[arg(long)]
        observation: PathBuf,

        /// JSON file with the current weather
        #[arg(long)]
        weather: Option<PathBuf>,

        /// JSON file with forecast points
        #[arg(long)]
        forecast: Option<PathBuf>,

        /// Forecast horizon in hours
        #[arg(long, default_value_t = 4)]
        horizon: u32,

        /// Record predictions to this prediction log
        #[arg(long)]
        log: Option<PathBuf>,

        /// Sensor id used when recording predictions
        #[arg(long, default_value = "default")]
        sensor_id: String,
    },

    /// Evaluate logged predictions for drift
    Evaluate {
        /// JSON prediction log
        #[arg(long)]
        log: PathBuf,

        /// Evaluation window in days
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Write a drift report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the current model and stored versions
    Status,

    /// Run one retraining check and retrain if needed
    Retrain {
        /// JSON file of sensor readings
        #[arg(long)]
        readings: PathBuf,

        /// JSON prediction log
        #[arg(long)]
        log: PathBuf,

        /// JSON file of historical weather
        #[arg(long)]
        weather: Option<PathBuf>,

        /// Write a drift report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Restore the previous model version
    Rollback,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;
    if let Err(e) = &result {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let model_dir = cli.model_dir.as_path();

    match cli.command {
        Commands::Train {
            readings,
            weather,
            lookback_days,
            min_samples,
        } => {
            model::train(
                model_dir,
                &readings,
                weather.as_deref(),
                lookback_days,
                min_samples,
                cli.format,
            )
            .await?;
        }
        Commands::Predict {
            observation,
            weather,
            forecast,
            horizon,
            log,
            sensor_id,
        } => {
            let target = log.as_deref().map(|path| predict::LogTarget {
                path,
                sensor_id: &sensor_id,
            });
            predict::predict(
                model_dir,
                &observation,
                weather.as_deref(),
                forecast.as_deref(),
                horizon,
                target,
                cli.format,
            )
            .await?;
        }
        Commands::Evaluate { log, days, report } => {
            drift::evaluate(&log, days, report.as_deref(), cli.format).await?;
        }
        Commands::Status => model::status(model_dir, cli.format)?,
        Commands::Retrain {
            readings,
            log,
            weather,
            report,
        } => {
            drift::retrain(
                model_dir,
                &readings,
                &log,
                weather.as_deref(),
                report.as_deref(),
                cli.format,
            )
            .await?;
        }
        Commands::Rollback => model::rollback(model_dir, cli.format)?,
    }

    Ok(())
}
