//! Component orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `portfwd-daemon`.
//! It validates configuration, installs the metrics recorder, logs into the
//! UniFi controller, builds the Kubernetes client and the Pod controller,
//! then runs the main loop until a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (so the first reconcile pass is already recorded)
//! 2. UniFi session (login, UniFi OS detection)
//! 3. Kubernetes client (in-cluster or kubeconfig)
//! 4. Pod controller (watch + per-key reconcile)
//!
//! # Shutdown
//!
//! The Pod controller is stopped through its graceful shutdown trigger:
//! in-flight passes finish, no new passes start.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use portfwd_controller::{ControllerSettings, PodController};
use portfwd_core::config::PortfwdConfig;
use portfwd_core::pipeline::Pipeline;
use portfwd_forwarding::{ForwardingConfig, ForwardingReconciler, UnifiClient};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status, log_health, probe_appliance};
use crate::metrics_server;

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: PortfwdConfig,
    /// Pod watch/reconcile loop.
    controller: PodController<UnifiClient>,
    /// Forwarding engine shared with the controller (used for health probes).
    forwarding: ForwardingReconciler<UnifiClient>,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The UniFi controller or the Kubernetes API cannot be reached
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = PortfwdConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: PortfwdConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let forwarding_config = ForwardingConfig::from_core(&config);
        forwarding_config
            .validate()
            .map_err(|e| anyhow::anyhow!("forwarding config invalid: {}", e))?;
        let settings = ControllerSettings::from_core(&config);
        settings
            .validate()
            .map_err(|e| anyhow::anyhow!("controller config invalid: {}", e))?;

        // Install metrics recorder before any component records
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        tracing::info!(
            base_url = %forwarding_config.base_url,
            site = %forwarding_config.site,
            "connecting to UniFi controller"
        );
        let unifi = UnifiClient::connect(&forwarding_config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to UniFi controller: {}", e))?;
        tracing::info!(unifi_os = unifi.is_unifi_os(), "UniFi session established");

        let forwarding = ForwardingReconciler::new(Arc::new(unifi), &forwarding_config);

        let kube_client = kube::Client::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

        let controller = PodController::new(kube_client, forwarding.clone(), settings)
            .map_err(|e| anyhow::anyhow!("failed to build pod controller: {}", e))?;

        tracing::info!(
            marker = %config.marker_annotation(),
            finalizer = %config.finalizer_name(),
            "orchestrator initialized"
        );

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config,
            controller,
            forwarding,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the controller and enter the main loop.
    ///
    /// Blocks until `SIGTERM` or `SIGINT` is received, logging the aggregated
    /// health every `health_interval_secs` meanwhile.
    pub async fn run(&mut self) -> Result<()> {
        self.controller
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start pod controller: {}", e))?;

        let mut uptime_updater_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        let mut health_interval = tokio::time::interval(Duration::from_secs(
            self.config.controller.health_interval_secs,
        ));
        health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // 첫 tick은 즉시 완료되므로 건너뜁니다
        health_interval.tick().await;

        tracing::info!("entering main loop");
        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        let signal = loop {
            tokio::select! {
                signal = &mut shutdown => break signal?,
                _ = health_interval.tick() => {
                    let health = self.health().await;
                    log_health(&health);
                }
            }
        };
        tracing::info!(signal = signal, "shutdown signal received");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_updater_task.take() {
            let _ = task.await;
        }

        self.controller
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop pod controller: {}", e))?;

        tracing::info!(
            succeeded = self.controller.stats().succeeded(),
            failed = self.controller.stats().failed(),
            "portfwd-daemon shut down"
        );
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let components = vec![
            ComponentHealth::new("pod-controller", self.controller.health_check().await),
            probe_appliance(&self.forwarding).await,
        ];

        let status = aggregate_status(&components);
        let uptime_secs = self.start_time.elapsed().as_secs();

        if self.config.metrics.enabled {
            use portfwd_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status,
            uptime_secs,
            components,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &PortfwdConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use portfwd_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
