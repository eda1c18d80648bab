//! Aggregated health check reporting.
//!
//! The orchestrator polls each component every `health_interval_secs` and
//! produces a unified [`DaemonHealth`] report. The overall daemon status is
//! the worst status among all components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use portfwd_core::pipeline::HealthStatus;
use portfwd_forwarding::{ApplianceClient, ForwardingReconciler};

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all components).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-component health reports.
    pub components: Vec<ComponentHealth>,
}

/// Health status for a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g., "pod-controller", "appliance").
    pub name: String,
    /// Current health status of the component.
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Aggregate multiple component health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    worst = HealthStatus::Degraded(String::new());
                }
                reasons.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

/// Probe the appliance by listing its forwarding rules.
///
/// A failed listing is reported as `Degraded`: reconcile passes keep
/// requeueing until the appliance answers again.
pub async fn probe_appliance<A: ApplianceClient>(
    forwarding: &ForwardingReconciler<A>,
) -> ComponentHealth {
    let status = match forwarding.list().await {
        Ok(rules) => {
            tracing::debug!(rules = rules.len(), "appliance probe succeeded");
            HealthStatus::Healthy
        }
        Err(e) => HealthStatus::Degraded(format!("appliance unreachable: {e}")),
    };
    ComponentHealth::new("appliance", status)
}

/// Log a health report at a level matching its status.
pub fn log_health(health: &DaemonHealth) {
    match &health.status {
        HealthStatus::Healthy => tracing::info!(
            uptime_secs = health.uptime_secs,
            components = health.components.len(),
            "daemon healthy"
        ),
        HealthStatus::Degraded(reason) => tracing::warn!(
            uptime_secs = health.uptime_secs,
            reason = %reason,
            "daemon degraded"
        ),
        HealthStatus::Unhealthy(reason) => tracing::error!(
            uptime_secs = health.uptime_secs,
            reason = %reason,
            "daemon unhealthy"
        ),
    }
}
