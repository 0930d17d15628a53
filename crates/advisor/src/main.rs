//! Irrigation Advisor - model lifecycle daemon
//!
//! Keeps the irrigation model fresh: monitors drift of served predictions,
//! retrains on schedule, and exposes health and metrics endpoints.

use advisor::{api, config::AdvisorConfig};
use advisor_lib::{
    drift::{DriftMonitor, RetrainingOrchestrator, RetrainingSources, RetrainingWorker},
    health::{components, HealthRegistry},
    observability::{AdvisorMetrics, StructuredLogger},
    sources::{JsonPredictionLog, JsonSensorStore, NoWeather, StaticWeather, WeatherSource},
    store::{ArtifactHandle, ModelStore},
    training::ModelTrainer,
    WeatherContext,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ADVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

async fn weather_source(config: &AdvisorConfig) -> Result<Arc<dyn WeatherSource>> {
    let Some(path) = &config.weather_file else {
        return Ok(Arc::new(NoWeather));
    };
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read weather file {}", path.display()))?;
    let points: Vec<WeatherContext> =
        serde_json::from_slice(&content).context("Invalid weather file")?;
    info!(points = points.len(), "Loaded weather history");
    Ok(Arc::new(StaticWeather::new(points)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting irrigation-advisor");

    let config = AdvisorConfig::load()?;
    info!(
        site = %config.site_name,
        model_dir = %config.model_dir.display(),
        "Advisor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL_STORE).await;
    health_registry.register(components::TRAINER).await;
    health_registry.register(components::DRIFT_MONITOR).await;

    let metrics = AdvisorMetrics::new();
    let logger = StructuredLogger::new(&config.site_name);

    let sensors = JsonSensorStore::open(&config.readings_file)
        .await
        .with_context(|| {
            format!(
                "Failed to open sensor readings {}",
                config.readings_file.display()
            )
        })?;
    let sources = RetrainingSources {
        sensors: Arc::new(sensors),
        weather: weather_source(&config).await?,
        log: Arc::new(JsonPredictionLog::new(&config.prediction_log_file)),
    };

    let handle = ArtifactHandle::new();
    let orchestrator = RetrainingOrchestrator::new(
        ModelTrainer::new(config.trainer_config()),
        ModelStore::new(config.store_config()),
        handle.clone(),
        sources,
    )
    .with_policy(config.retrain_policy())
    .with_monitor(DriftMonitor::new(config.drift_thresholds()))
    .with_logger(logger.clone())
    .with_health(health_registry.clone())
    .with_report_path(&config.drift_report_file);

    if let Err(e) = orchestrator.ensure_loaded().await {
        warn!(error = %e, "Stored model could not be loaded");
        health_registry
            .set_degraded(components::MODEL_STORE, e.to_string())
            .await;
    }
    logger.log_startup(ADVISOR_VERSION, handle.version().as_deref());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        handle.clone(),
    ));

    health_registry.set_ready(true).await;

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = RetrainingWorker::new(Arc::new(orchestrator));
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server stopped"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        error!(error = %e, "Retraining worker task failed");
    }
    info!("Shutting down");

    Ok(())
}
