//! kube 런타임 연결
//!
//! [`PodController`]는 `kube::runtime::Controller`로 Pod를 감시하고
//! 이벤트마다 [`LifecycleGuard`]의 조정 패스를 실행합니다.
//! 서로 다른 Pod는 동시에 조정되고, 같은 Pod 키에 대한 패스는 런타임이 직렬화합니다.
//!
//! core의 `Pipeline` trait을 구현하여 `portfwd-daemon`이 start/stop/health_check로 관리합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use portfwd_core::error::{PipelineError, PortfwdError};
use portfwd_core::pipeline::{HealthStatus, Pipeline};
use portfwd_forwarding::{ApplianceClient, ForwardingReconciler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerSettings;
use crate::error::ControllerError;
use crate::lifecycle::LifecycleGuard;
use crate::workload::{KubeWorkloadStore, WorkloadRecord, WorkloadStore};

/// 정지 시 진행 중인 패스를 기다리는 최대 시간
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 컨트롤러 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Initialized,
    Running,
    Stopped,
}

/// 조정 패스 통계
#[derive(Debug, Default)]
pub struct ReconcileStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl ReconcileStats {
    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 성공한 패스 수
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// 실패한 패스 수
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 마지막 성공 이후 연속 실패 수
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// kube 런타임에 넘기는 조정 컨텍스트
pub struct ReconcileContext<A, S> {
    guard: LifecycleGuard<A, S>,
    error_requeue: Duration,
    stats: Arc<ReconcileStats>,
}

impl<A: ApplianceClient, S: WorkloadStore> ReconcileContext<A, S> {
    pub fn new(guard: LifecycleGuard<A, S>, error_requeue: Duration) -> Self {
        Self {
            guard,
            error_requeue,
            stats: Arc::new(ReconcileStats::default()),
        }
    }

    pub fn guard(&self) -> &LifecycleGuard<A, S> {
        &self.guard
    }

    pub fn stats(&self) -> &Arc<ReconcileStats> {
        &self.stats
    }
}

/// Pod 이벤트 하나를 조정합니다.
///
/// 런타임 캐시의 Pod로 관리 대상 여부를 먼저 판단하므로 관리 대상이 아닌 Pod는
/// API 서버를 다시 조회하지 않습니다.
/// 성공하면 다음 변경 이벤트까지 기다리고, 실패하면 에러를 반환하여
/// [`error_policy`]가 재시도 간격을 정하게 합니다.
pub async fn reconcile_pod<A: ApplianceClient, S: WorkloadStore>(
    pod: Arc<Pod>,
    ctx: Arc<ReconcileContext<A, S>>,
) -> Result<Action, ControllerError> {
    let observed = WorkloadRecord::try_from(&*pod)?;
    match ctx.guard.reconcile_observed(&observed).await {
        Ok(outcome) => {
            ctx.stats.record_success();
            debug!(workload = %observed.key(), mode = outcome.mode(), "reconcile pass finished");
            Ok(Action::await_change())
        }
        Err(e) => {
            ctx.stats.record_failure();
            Err(e)
        }
    }
}

/// 실패한 패스를 설정된 간격 뒤에 다시 큐에 넣습니다.
pub fn error_policy<A, S>(
    pod: Arc<Pod>,
    error: &ControllerError,
    ctx: Arc<ReconcileContext<A, S>>,
) -> Action {
    warn!(
        namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
        name = pod.metadata.name.as_deref().unwrap_or_default(),
        error = %error,
        requeue_secs = ctx.error_requeue.as_secs(),
        "reconcile failed, requeueing"
    );
    Action::requeue(ctx.error_requeue)
}

/// Pod 컨트롤러
///
/// # 사용 예시
/// ```ignore
/// let unifi = Arc::new(UnifiClient::connect(&forwarding_config).await?);
/// let forwarding = ForwardingReconciler::new(unifi, &forwarding_config);
/// let mut controller = PodController::new(kube_client, forwarding, settings)?;
/// controller.start().await?;
/// ```
pub struct PodController<A> {
    settings: ControllerSettings,
    state: ControllerState,
    client: kube::Client,
    context: Arc<ReconcileContext<A, KubeWorkloadStore>>,
    shutdown: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl<A: ApplianceClient> PodController<A> {
    /// 새 컨트롤러를 생성합니다.
    pub fn new(
        client: kube::Client,
        forwarding: ForwardingReconciler<A>,
        settings: ControllerSettings,
    ) -> Result<Self, ControllerError> {
        settings.validate()?;

        let store = Arc::new(KubeWorkloadStore::new(client.clone()));
        let guard = LifecycleGuard::new(forwarding, store, &settings.domain);
        let context = Arc::new(ReconcileContext::new(guard, settings.error_requeue));

        Ok(Self {
            settings,
            state: ControllerState::Initialized,
            client,
            context,
            shutdown: CancellationToken::new(),
            task: None,
        })
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ControllerState::Initialized => "initialized",
            ControllerState::Running => "running",
            ControllerState::Stopped => "stopped",
        }
    }

    /// 조정 통계를 반환합니다.
    pub fn stats(&self) -> Arc<ReconcileStats> {
        Arc::clone(self.context.stats())
    }

    fn pod_api(&self) -> Api<Pod> {
        match &self.settings.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

impl<A: ApplianceClient> Pipeline for PodController<A> {
    async fn start(&mut self) -> Result<(), PortfwdError> {
        if self.state == ControllerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        if self.state == ControllerState::Stopped {
            return Err(PipelineError::InitFailed(
                "controller was stopped; build a new one to restart".to_owned(),
            )
            .into());
        }

        info!(
            namespace = self.settings.namespace.as_deref().unwrap_or("<all>"),
            domain = %self.settings.domain,
            "starting pod controller"
        );

        let controller = Controller::new(self.pod_api(), watcher::Config::default())
            .graceful_shutdown_on(self.shutdown.clone().cancelled_owned());
        let context = Arc::clone(&self.context);

        let task = tokio::spawn(async move {
            controller
                .run(
                    reconcile_pod::<A, KubeWorkloadStore>,
                    error_policy::<A, KubeWorkloadStore>,
                    context,
                )
                .for_each(|result| async move {
                    match result {
                        Ok((object, _)) => debug!(object = %object, "reconciled"),
                        Err(kube::runtime::controller::Error::ReconcilerFailed(e, object)) => {
                            debug!(object = %object, error = %e, "reconciler failed")
                        }
                        Err(e) => warn!(error = %e, "pod controller error"),
                    }
                })
                .await;
            info!("pod controller loop finished");
        });

        self.task = Some(task);
        self.state = ControllerState::Running;
        info!("pod controller started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PortfwdError> {
        if self.state != ControllerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping pod controller");
        self.shutdown.cancel();

        if let Some(mut task) = self.task.take() {
            // 진행 중인 패스가 끝나기를 기다리되 무한정 기다리지는 않습니다
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "pod controller did not stop in time, aborting"
                );
                task.abort();
            }
        }

        self.state = ControllerState::Stopped;
        info!("pod controller stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ControllerState::Running => {
                if self.task.as_ref().is_some_and(|t| t.is_finished()) {
                    return HealthStatus::Unhealthy("controller loop exited".to_owned());
                }
                let failures = self.context.stats().consecutive_failures();
                if failures > 0 {
                    HealthStatus::Degraded(format!("{failures} consecutive reconcile failures"))
                } else {
                    HealthStatus::Healthy
                }
            }
            ControllerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ControllerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use portfwd_core::types::ForwardRule;
    use portfwd_forwarding::ForwardingError;

    use super::*;
    use crate::workload::MockWorkloadStore;

    const DOMAIN: &str = "example.org";

    #[derive(Default)]
    struct StaticAppliance {
        fail: bool,
    }

    impl ApplianceClient for StaticAppliance {
        async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
            if self.fail {
                return Err(ForwardingError::ApplianceConnection("down".to_owned()));
            }
            Ok(Vec::new())
        }

        async fn create(&self, _rules: &[ForwardRule]) -> Result<(), ForwardingError> {
            Ok(())
        }

        async fn delete(&self, _rules: &[ForwardRule]) -> Result<(), ForwardingError> {
            Ok(())
        }
    }

    fn pod(name: &str, managed: bool) -> Arc<Pod> {
        let annotations = managed
            .then(|| BTreeMap::from([(format!("{DOMAIN}/enable"), "true".to_owned())]));
        Arc::new(Pod {
            metadata: ObjectMeta {
                namespace: Some("games".to_owned()),
                name: Some(name.to_owned()),
                annotations,
                ..ObjectMeta::default()
            },
            ..Pod::default()
        })
    }

    fn managed_record() -> WorkloadRecord {
        WorkloadRecord {
            namespace: "games".to_owned(),
            name: "mc".to_owned(),
            annotations: BTreeMap::from([(format!("{DOMAIN}/enable"), "true".to_owned())]),
            ..WorkloadRecord::default()
        }
    }

    fn context(
        appliance: StaticAppliance,
        store: MockWorkloadStore,
    ) -> Arc<ReconcileContext<StaticAppliance, MockWorkloadStore>> {
        let forwarding =
            ForwardingReconciler::with_timeout(Arc::new(appliance), Duration::from_secs(5));
        let guard = LifecycleGuard::new(forwarding, Arc::new(store), DOMAIN);
        Arc::new(ReconcileContext::new(guard, Duration::from_secs(7)))
    }

    #[tokio::test]
    async fn successful_pass_awaits_change() {
        let ctx = context(
            StaticAppliance::default(),
            MockWorkloadStore::new().with_record(managed_record()),
        );

        let action = reconcile_pod(pod("mc", true), Arc::clone(&ctx)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(ctx.stats().succeeded(), 1);
        assert_eq!(ctx.stats().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn failed_pass_counts_and_requeues() {
        let ctx = context(
            StaticAppliance { fail: true },
            MockWorkloadStore::new().with_record(managed_record()),
        );

        let err = reconcile_pod(pod("mc", true), Arc::clone(&ctx)).await.unwrap_err();
        let action = error_policy(pod("mc", true), &err, Arc::clone(&ctx));

        assert_eq!(action, Action::requeue(Duration::from_secs(7)));
        assert_eq!(ctx.stats().failed(), 1);
        assert_eq!(ctx.stats().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let ctx = context(StaticAppliance::default(), MockWorkloadStore::new());
        ctx.stats().record_failure();
        ctx.stats().record_failure();

        reconcile_pod(pod("absent", true), Arc::clone(&ctx)).await.unwrap();

        assert_eq!(ctx.stats().failed(), 2);
        assert_eq!(ctx.stats().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn unmanaged_pod_skips_store_lookup() {
        let ctx = context(
            StaticAppliance { fail: true },
            MockWorkloadStore::new().with_record(WorkloadRecord {
                annotations: BTreeMap::new(),
                ..managed_record()
            }),
        );

        let action = reconcile_pod(pod("mc", false), Arc::clone(&ctx)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(ctx.guard().store().gets(), 0);
        assert_eq!(ctx.stats().succeeded(), 1);
    }

    #[tokio::test]
    async fn managed_pod_reads_store_once() {
        let ctx = context(
            StaticAppliance::default(),
            MockWorkloadStore::new().with_record(managed_record()),
        );

        reconcile_pod(pod("mc", true), Arc::clone(&ctx)).await.unwrap();

        assert_eq!(ctx.guard().store().gets(), 1);
    }

    #[tokio::test]
    async fn pod_without_namespace_is_invalid() {
        let ctx = context(StaticAppliance::default(), MockWorkloadStore::new());
        let pod = Arc::new(Pod {
            metadata: ObjectMeta {
                name: Some("mc".to_owned()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        });

        let err = reconcile_pod(pod, Arc::clone(&ctx)).await.unwrap_err();

        assert!(matches!(err, ControllerError::InvalidWorkload { .. }));
        assert_eq!(ctx.guard().store().gets(), 0);
    }
}
