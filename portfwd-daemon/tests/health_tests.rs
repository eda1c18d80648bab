//! Health aggregation tests.
//!
//! Tests the health status aggregation logic and the appliance probe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use portfwd_core::pipeline::HealthStatus;
use portfwd_core::types::ForwardRule;
use portfwd_daemon::health::{ComponentHealth, DaemonHealth, aggregate_status, probe_appliance};
use portfwd_forwarding::{ApplianceClient, ForwardingError, ForwardingReconciler};

#[derive(Default)]
struct ToggleAppliance {
    down: AtomicBool,
}

impl ApplianceClient for ToggleAppliance {
    async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ForwardingError::ApplianceConnection(
                "connection refused".to_owned(),
            ));
        }
        Ok(vec![ForwardRule::new("games-minecraft", "192.168.1.20", 25565)])
    }

    async fn create(&self, _rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        Ok(())
    }

    async fn delete(&self, _rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        Ok(())
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    let components = vec![
        ComponentHealth::new("pod-controller", HealthStatus::Healthy),
        ComponentHealth::new("appliance", HealthStatus::Healthy),
    ];

    assert!(aggregate_status(&components).is_healthy());
}

#[test]
fn test_aggregate_status_one_degraded() {
    let components = vec![
        ComponentHealth::new("pod-controller", HealthStatus::Healthy),
        ComponentHealth::new(
            "appliance",
            HealthStatus::Degraded("appliance unreachable".to_owned()),
        ),
    ];

    let status = aggregate_status(&components);

    if let HealthStatus::Degraded(reason) = &status {
        assert!(reason.contains("appliance"), "reason should name the component");
        assert!(reason.contains("unreachable"), "reason should keep the original text");
    } else {
        panic!("expected Degraded status, got: {:?}", status);
    }
}

#[test]
fn test_aggregate_status_unhealthy_wins_over_degraded() {
    let components = vec![
        ComponentHealth::new("pod-controller", HealthStatus::Unhealthy("stopped".to_owned())),
        ComponentHealth::new("appliance", HealthStatus::Degraded("slow".to_owned())),
    ];

    let status = aggregate_status(&components);

    match status {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.contains("pod-controller: stopped"));
            assert!(reason.contains("appliance: slow"));
        }
        other => panic!("expected Unhealthy status, got: {:?}", other),
    }
}

#[test]
fn test_aggregate_status_empty_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_daemon_health_serializes() {
    let health = DaemonHealth {
        status: HealthStatus::Healthy,
        uptime_secs: 42,
        components: vec![ComponentHealth::new("appliance", HealthStatus::Healthy)],
    };

    let json = serde_json::to_value(&health).expect("health should serialize");

    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["components"][0]["name"], "appliance");
}

#[tokio::test]
async fn test_probe_appliance_reports_reachability() {
    let appliance = Arc::new(ToggleAppliance::default());
    let forwarding =
        ForwardingReconciler::with_timeout(Arc::clone(&appliance), Duration::from_secs(1));

    let healthy = probe_appliance(&forwarding).await;
    assert_eq!(healthy.name, "appliance");
    assert!(healthy.status.is_healthy());

    appliance.down.store(true, Ordering::SeqCst);
    let degraded = probe_appliance(&forwarding).await;
    match degraded.status {
        HealthStatus::Degraded(reason) => assert!(reason.contains("connection refused")),
        other => panic!("expected Degraded status, got: {:?}", other),
    }
}
