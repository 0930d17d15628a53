//! Health check infrastructure for the advisor daemon
//!
//! Tracks the model store, the trainer and the drift monitor, and folds
//! their state into liveness and readiness responses.

use crate::drift::Stability;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, but with a stale, missing or drifting model
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        *self < ComponentStatus::Unhealthy
    }
}

/// Last reported state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status over all components
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const MODEL_STORE: &str = "model_store";
    pub const TRAINER: &str = "trainer";
    pub const DRIFT_MONITOR: &str = "drift_monitor";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    model_version: Option<String>,
    ready: bool,
}

/// Shared view of advisor component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Reflect whether a model is being served
    pub async fn record_model(&self, version: Option<&str>) {
        let (status, message) = match version {
            Some(v) => (ComponentStatus::Healthy, format!("serving {v}")),
            None => (
                ComponentStatus::Degraded,
                "no trained model available".to_string(),
            ),
        };
        let mut state = self.state.write().await;
        state.model_version = version.map(str::to_string);
        state.components.insert(
            components::MODEL_STORE.to_string(),
            ComponentHealth::new(status, Some(message)),
        );
    }

    /// Reflect the outcome of the last drift check
    pub async fn record_drift(&self, stability: Stability) {
        let (status, message) = match stability {
            Stability::Stable => (ComponentStatus::Healthy, None),
            Stability::Drifted => (ComponentStatus::Degraded, Some("model drift detected")),
            Stability::Unknown => (
                ComponentStatus::Degraded,
                Some("insufficient evaluation data"),
            ),
        };
        self.set(components::DRIFT_MONITOR, status, message.map(str::to_string))
            .await;
    }

    /// A failed retraining degrades the trainer until the next success
    pub async fn record_training(&self, error: Option<&str>) {
        match error {
            None => self.set(components::TRAINER, ComponentStatus::Healthy, None).await,
            Some(e) => self.set_degraded(components::TRAINER, e).await,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            model_version: state.model_version.clone(),
            components: state.components.clone(),
        }
    }

    /// Ready once initialized, as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if !state.ready {
            Some("Advisor not yet initialized".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, c)| !c.status.is_operational())
                .map(|(name, _)| format!("Component {name} unhealthy"))
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_healthy_and_empty() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(health.model_version.is_none());
    }

    #[test]
    fn test_status_ordering() {
        assert!(ComponentStatus::Healthy < ComponentStatus::Degraded);
        assert!(ComponentStatus::Degraded.is_operational());
        assert!(!ComponentStatus::Unhealthy.is_operational());
    }

    #[tokio::test]
    async fn test_missing_model_degrades() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL_STORE).await;
        registry.record_model(None).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);

        registry.record_model(Some("v1")).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.model_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_drift_status_mapping() {
        let registry = HealthRegistry::new();

        registry.record_drift(Stability::Stable).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.record_drift(Stability::Drifted).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.record_drift(Stability::Unknown).await;
        let health = registry.health().await;
        let drift = &health.components[components::DRIFT_MONITOR];
        assert_eq!(drift.status, ComponentStatus::Degraded);
        assert_eq!(drift.message.as_deref(), Some("insufficient evaluation data"));
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.record_drift(Stability::Drifted).await;
        registry
            .set_unhealthy(components::MODEL_STORE, "model directory unreadable")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_training_failure_carries_error() {
        let registry = HealthRegistry::new();
        registry.record_training(Some("insufficient data")).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::TRAINER].message.as_deref(),
            Some("insufficient data")
        );

        registry.record_training(None).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_degraded_advisor_is_still_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.record_drift(Stability::Drifted).await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_component() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::MODEL_STORE, "model directory unreadable")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Component model_store unhealthy")
        );
    }
}
