//! 워크로드 생명주기 조정
//!
//! [`LifecycleGuard`]는 Pod 이벤트 하나당 한 번의 조정 패스를 실행합니다.
//!
//! # 상태 전이
//!
//! ```text
//!             ┌──────────────────────────────┐
//!  Present ──►│ ensure_addresses(desired)    │──► finalizer 없으면 추가
//!             └──────────────────────────────┘
//!             ┌──────────────────────────────┐
//!  Terminating│ delete_addresses(desired)    │──► finalizer 있으면 제거
//!             └──────────────────────────────┘    (실제 삭제 허용)
//! ```
//!
//! 어플라이언스 호출이 실패하면 finalizer를 건드리지 않고 에러를 반환하므로
//! 규칙이 정리되기 전에는 Pod가 사라지지 않습니다.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use portfwd_core::metrics as m;
use portfwd_core::types::ForwardRule;
use portfwd_forwarding::{ApplianceClient, ForwardingReconciler, ReconcilePlan};
use tracing::{debug, info, instrument};

use crate::error::ControllerError;
use crate::extract::desired_rules;
use crate::workload::{WorkloadKey, WorkloadRecord, WorkloadStore};

/// 워크로드의 관찰 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadPhase {
    /// 삭제 요청 없음
    Present,
    /// 삭제 요청됨 (finalizer가 실제 삭제를 막고 있음)
    Terminating,
}

impl WorkloadPhase {
    pub fn of(record: &WorkloadRecord) -> Self {
        if record.deletion_requested {
            Self::Terminating
        } else {
            Self::Present
        }
    }

    /// 이 단계에서 실행되는 경로의 모드 이름 (성공/실패 모두 같은 레이블)
    pub fn mode(self) -> &'static str {
        match self {
            Self::Present => "ensure",
            Self::Terminating => "delete",
        }
    }
}

/// 레코드 조회 단계에서 실패한 패스의 모드 이름
const LOOKUP_MODE: &str = "lookup";

/// 조정 패스 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// 레코드가 이미 사라짐
    Gone,
    /// 관리 대상 어노테이션이 없음
    Ignored,
    /// 규칙을 수렴시킴
    Ensured {
        plan: ReconcilePlan,
        finalizer_added: bool,
    },
    /// 규칙을 정리함
    Released {
        deleted: Vec<ForwardRule>,
        finalizer_removed: bool,
    },
}

impl PassOutcome {
    /// 메트릭 레이블에 쓰는 모드 이름
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Ignored => "ignored",
            Self::Ensured { .. } => "ensure",
            Self::Released { .. } => "delete",
        }
    }
}

/// Pod 생명주기 가드
///
/// 어노테이션 도메인은 생성 시 주입되며 마커 어노테이션(`<domain>/enable`)과
/// finalizer(`finalizer.<domain>/v1`) 이름이 여기서 파생됩니다.
pub struct LifecycleGuard<A, S> {
    forwarding: ForwardingReconciler<A>,
    store: Arc<S>,
    marker: String,
    finalizer: String,
}

impl<A: ApplianceClient, S: WorkloadStore> LifecycleGuard<A, S> {
    /// 새 가드를 생성합니다.
    pub fn new(forwarding: ForwardingReconciler<A>, store: Arc<S>, domain: &str) -> Self {
        Self {
            forwarding,
            store,
            marker: format!("{domain}/enable"),
            finalizer: format!("finalizer.{domain}/v1"),
        }
    }

    /// 마커 어노테이션 키
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// finalizer 이름
    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn forwarding(&self) -> &ForwardingReconciler<A> {
        &self.forwarding
    }

    /// 관리 대상 워크로드인지 확인합니다 (`<domain>/enable: "true"`).
    pub fn is_managed(&self, record: &WorkloadRecord) -> bool {
        record.annotation(&self.marker) == Some("true")
    }

    /// 캐시에서 관찰한 레코드로 먼저 관리 대상 여부를 거릅니다.
    ///
    /// 관리 대상이 아니면 저장소를 조회하지 않고 [`PassOutcome::Ignored`]를 반환합니다.
    /// 관리 대상이면 finalizer 갱신의 resource version 전제 조건을 위해
    /// [`reconcile`](Self::reconcile)로 최신 레코드를 다시 읽습니다.
    #[instrument(skip_all, fields(workload = %observed.key()))]
    pub async fn reconcile_observed(
        &self,
        observed: &WorkloadRecord,
    ) -> Result<PassOutcome, ControllerError> {
        if !self.is_managed(observed) {
            debug!("cached workload is not managed");
            record_pass(PassOutcome::Ignored.mode(), true, Instant::now());
            return Ok(PassOutcome::Ignored);
        }
        self.reconcile(&observed.key()).await
    }

    /// 워크로드 하나에 대해 조정 패스를 실행합니다.
    ///
    /// 같은 키에 대한 호출은 동시에 실행되지 않아야 합니다.
    #[instrument(skip_all, fields(workload = %key))]
    pub async fn reconcile(&self, key: &WorkloadKey) -> Result<PassOutcome, ControllerError> {
        let started = Instant::now();
        let (mode, result) = self.run_pass(key).await;
        record_pass(mode, result.is_ok(), started);
        result
    }

    /// 패스를 실행하고 실패하더라도 어느 경로였는지 모드 이름을 함께 돌려줍니다.
    async fn run_pass(
        &self,
        key: &WorkloadKey,
    ) -> (&'static str, Result<PassOutcome, ControllerError>) {
        let record = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("workload no longer exists");
                return (PassOutcome::Gone.mode(), Ok(PassOutcome::Gone));
            }
            Err(e) => return (LOOKUP_MODE, Err(e)),
        };

        if !self.is_managed(&record) {
            debug!("workload is not managed");
            return (PassOutcome::Ignored.mode(), Ok(PassOutcome::Ignored));
        }

        let desired = desired_rules(&record);
        let phase = WorkloadPhase::of(&record);
        let result = match phase {
            WorkloadPhase::Present => self.ensure(&record, &desired).await,
            WorkloadPhase::Terminating => self.release(&record, &desired).await,
        };
        (phase.mode(), result)
    }

    async fn ensure(
        &self,
        record: &WorkloadRecord,
        desired: &[ForwardRule],
    ) -> Result<PassOutcome, ControllerError> {
        let plan = self.forwarding.ensure_addresses(desired).await?;

        let finalizer_added = if record.has_finalizer(&self.finalizer) {
            false
        } else {
            let mut finalizers = record.finalizers.clone();
            finalizers.push(self.finalizer.clone());
            self.write_finalizers(record, finalizers, "attach").await?
        };

        info!(
            rules = desired.len(),
            deleted = plan.stale.len(),
            created = plan.missing.len(),
            finalizer_added,
            "workload forwarding ensured"
        );
        Ok(PassOutcome::Ensured {
            plan,
            finalizer_added,
        })
    }

    async fn release(
        &self,
        record: &WorkloadRecord,
        desired: &[ForwardRule],
    ) -> Result<PassOutcome, ControllerError> {
        let deleted = self.forwarding.delete_addresses(desired).await?;

        let finalizer_removed = if record.has_finalizer(&self.finalizer) {
            let finalizers = record
                .finalizers
                .iter()
                .filter(|f| **f != self.finalizer)
                .cloned()
                .collect();
            self.write_finalizers(record, finalizers, "detach").await?
        } else {
            false
        };

        info!(
            deleted = deleted.len(),
            finalizer_removed, "workload forwarding released"
        );
        Ok(PassOutcome::Released {
            deleted,
            finalizer_removed,
        })
    }

    /// finalizer를 기록합니다. 그 사이 레코드가 사라졌다면 쓰지 않은 것으로 보고 성공 처리합니다.
    async fn write_finalizers(
        &self,
        record: &WorkloadRecord,
        finalizers: Vec<String>,
        mode: &'static str,
    ) -> Result<bool, ControllerError> {
        match self.store.set_finalizers(record, finalizers).await {
            Ok(()) => {
                counter!(m::RECONCILE_FINALIZER_UPDATES_TOTAL, m::LABEL_MODE => mode).increment(1);
                Ok(true)
            }
            Err(ControllerError::WorkloadNotFound(_)) => {
                debug!(mode, "workload vanished before finalizer update");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn record_pass(mode: &'static str, succeeded: bool, started: Instant) {
    let status = if succeeded { "success" } else { "failure" };
    counter!(m::RECONCILE_PASSES_TOTAL, m::LABEL_MODE => mode, m::LABEL_RESULT => status)
        .increment(1);
    histogram!(m::RECONCILE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use portfwd_forwarding::ForwardingError;

    use super::*;
    use crate::workload::{MockWorkloadStore, PortDeclaration};

    const DOMAIN: &str = "example.org";
    const FINALIZER: &str = "finalizer.example.org/v1";

    /// 호출 수를 세는 메모리 어플라이언스
    #[derive(Default)]
    struct CountingAppliance {
        rules: Mutex<Vec<ForwardRule>>,
        calls: Mutex<usize>,
        fail: bool,
    }

    impl CountingAppliance {
        fn with_rules(rules: Vec<ForwardRule>) -> Self {
            Self {
                rules: Mutex::new(rules),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn rules(&self) -> Vec<ForwardRule> {
            self.rules.lock().unwrap().clone()
        }

        fn touch(&self) -> Result<(), ForwardingError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(ForwardingError::ApplianceConnection("unreachable".to_owned()));
            }
            Ok(())
        }
    }

    impl ApplianceClient for CountingAppliance {
        async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
            self.touch()?;
            Ok(self.rules())
        }

        async fn create(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
            self.touch()?;
            self.rules.lock().unwrap().extend(rules.iter().cloned());
            Ok(())
        }

        async fn delete(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
            self.touch()?;
            self.rules.lock().unwrap().retain(|r| !rules.contains(r));
            Ok(())
        }
    }

    fn record(managed: bool, terminating: bool, finalizers: &[&str]) -> WorkloadRecord {
        let mut annotations = BTreeMap::new();
        if managed {
            annotations.insert(format!("{DOMAIN}/enable"), "true".to_owned());
        }
        WorkloadRecord {
            namespace: "games".to_owned(),
            name: "mc".to_owned(),
            annotations,
            finalizers: finalizers.iter().map(|f| (*f).to_owned()).collect(),
            deletion_requested: terminating,
            host_ip: Some("192.168.1.20".to_owned()),
            resource_version: Some("1".to_owned()),
            ports: vec![PortDeclaration {
                container: "server".to_owned(),
                container_port: 25565,
                host_port: Some(25565),
                protocol: "TCP".to_owned(),
            }],
        }
    }

    fn key() -> WorkloadKey {
        WorkloadKey::new("games", "mc")
    }

    fn rule() -> ForwardRule {
        ForwardRule::new("games-mc", "192.168.1.20", 25565)
    }

    fn guard(
        appliance: CountingAppliance,
        store: MockWorkloadStore,
    ) -> LifecycleGuard<CountingAppliance, MockWorkloadStore> {
        let forwarding =
            ForwardingReconciler::with_timeout(Arc::new(appliance), Duration::from_secs(5));
        LifecycleGuard::new(forwarding, Arc::new(store), DOMAIN)
    }

    #[test]
    fn names_derive_from_domain() {
        let guard = guard(CountingAppliance::default(), MockWorkloadStore::new());
        assert_eq!(guard.marker(), "example.org/enable");
        assert_eq!(guard.finalizer(), FINALIZER);
    }

    #[test]
    fn marker_must_be_exactly_true() {
        let guard = guard(CountingAppliance::default(), MockWorkloadStore::new());
        let mut rec = record(false, false, &[]);
        rec.annotations
            .insert(format!("{DOMAIN}/enable"), "yes".to_owned());
        assert!(!guard.is_managed(&rec));
        assert!(guard.is_managed(&record(true, false, &[])));
    }

    #[tokio::test]
    async fn missing_record_is_noop() {
        let guard = guard(CountingAppliance::default(), MockWorkloadStore::new());
        let outcome = guard.reconcile(&key()).await.unwrap();
        assert_eq!(outcome, PassOutcome::Gone);
        assert_eq!(guard.forwarding().client().calls(), 0);
    }

    #[tokio::test]
    async fn unmanaged_workload_makes_zero_appliance_calls() {
        let store = MockWorkloadStore::new().with_record(record(false, false, &[]));
        let guard = guard(CountingAppliance::default(), store);

        let outcome = guard.reconcile(&key()).await.unwrap();

        assert_eq!(outcome, PassOutcome::Ignored);
        assert_eq!(guard.forwarding().client().calls(), 0);
        assert_eq!(guard.store().writes(), 0);
    }

    #[tokio::test]
    async fn present_creates_rules_and_attaches_finalizer() {
        let store = MockWorkloadStore::new().with_record(record(true, false, &[]));
        let guard = guard(CountingAppliance::default(), store);

        let outcome = guard.reconcile(&key()).await.unwrap();

        assert!(matches!(
            outcome,
            PassOutcome::Ensured {
                finalizer_added: true,
                ..
            }
        ));
        assert_eq!(guard.forwarding().client().rules(), vec![rule()]);
        let stored = guard.store().record(&key()).unwrap();
        assert!(stored.has_finalizer(FINALIZER));
    }

    #[tokio::test]
    async fn present_with_finalizer_writes_nothing() {
        let store = MockWorkloadStore::new().with_record(record(true, false, &[FINALIZER]));
        let guard = guard(CountingAppliance::with_rules(vec![rule()]), store);

        let outcome = guard.reconcile(&key()).await.unwrap();

        assert!(matches!(
            outcome,
            PassOutcome::Ensured {
                finalizer_added: false,
                ..
            }
        ));
        assert_eq!(guard.store().writes(), 0);
    }

    #[tokio::test]
    async fn appliance_failure_leaves_finalizer_untouched() {
        let store = MockWorkloadStore::new().with_record(record(true, false, &[]));
        let guard = guard(CountingAppliance::failing(), store);

        let err = guard.reconcile(&key()).await.unwrap_err();

        assert!(matches!(err, ControllerError::Forwarding(_)));
        assert_eq!(guard.store().writes(), 0);
    }

    #[tokio::test]
    async fn terminating_deletes_rules_and_detaches_finalizer() {
        let store = MockWorkloadStore::new().with_record(record(
            true,
            true,
            &["other/keep", FINALIZER],
        ));
        let guard = guard(CountingAppliance::with_rules(vec![rule()]), store);

        let outcome = guard.reconcile(&key()).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Released {
                deleted: vec![rule()],
                finalizer_removed: true,
            }
        );
        assert!(guard.forwarding().client().rules().is_empty());
        let stored = guard.store().record(&key()).unwrap();
        assert_eq!(stored.finalizers, vec!["other/keep".to_owned()]);
    }

    #[tokio::test]
    async fn terminating_appliance_failure_keeps_finalizer() {
        let store = MockWorkloadStore::new().with_record(record(true, true, &[FINALIZER]));
        let guard = guard(CountingAppliance::failing(), store);

        assert!(guard.reconcile(&key()).await.is_err());
        let stored = guard.store().record(&key()).unwrap();
        assert!(stored.has_finalizer(FINALIZER));
    }

    #[tokio::test]
    async fn finalizer_write_on_vanished_record_succeeds() {
        let store = MockWorkloadStore::new()
            .with_record(record(true, true, &[FINALIZER]))
            .with_vanishing_record();
        let guard = guard(CountingAppliance::with_rules(vec![rule()]), store);

        let outcome = guard.reconcile(&key()).await.unwrap();

        assert!(matches!(
            outcome,
            PassOutcome::Released {
                finalizer_removed: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn finalizer_write_failure_is_returned() {
        let store = MockWorkloadStore::new()
            .with_record(record(true, false, &[]))
            .with_failing_writes();
        let guard = guard(CountingAppliance::default(), store);

        assert!(guard.reconcile(&key()).await.is_err());
        // 규칙은 이미 생성되었고 다음 패스에서 finalizer만 다시 시도합니다
        assert_eq!(guard.forwarding().client().rules(), vec![rule()]);
    }

    #[test]
    fn phase_follows_deletion_flag() {
        assert_eq!(
            WorkloadPhase::of(&record(true, false, &[])),
            WorkloadPhase::Present
        );
        assert_eq!(
            WorkloadPhase::of(&record(true, true, &[])),
            WorkloadPhase::Terminating
        );
    }

    #[tokio::test]
    async fn unmanaged_observation_skips_store_lookup() {
        let store = MockWorkloadStore::new().with_record(record(false, false, &[]));
        let guard = guard(CountingAppliance::default(), store);

        let outcome = guard
            .reconcile_observed(&record(false, false, &[]))
            .await
            .unwrap();

        assert_eq!(outcome, PassOutcome::Ignored);
        assert_eq!(guard.store().gets(), 0);
        assert_eq!(guard.forwarding().client().calls(), 0);
    }

    #[tokio::test]
    async fn managed_observation_reads_fresh_record() {
        // 캐시에는 finalizer가 없지만 최신 레코드에는 이미 붙어 있습니다
        let store = MockWorkloadStore::new().with_record(record(true, false, &[FINALIZER]));
        let guard = guard(CountingAppliance::with_rules(vec![rule()]), store);

        let outcome = guard
            .reconcile_observed(&record(true, false, &[]))
            .await
            .unwrap();

        assert_eq!(guard.store().gets(), 1);
        assert!(matches!(
            outcome,
            PassOutcome::Ensured {
                finalizer_added: false,
                ..
            }
        ));
        assert_eq!(guard.store().writes(), 0);
    }

    #[tokio::test]
    async fn failed_ensure_keeps_ensure_mode() {
        let store = MockWorkloadStore::new().with_record(record(true, false, &[]));
        let guard = guard(CountingAppliance::failing(), store);

        let (mode, result) = guard.run_pass(&key()).await;

        assert_eq!(mode, "ensure");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_release_keeps_delete_mode() {
        let store = MockWorkloadStore::new().with_record(record(true, true, &[FINALIZER]));
        let guard = guard(CountingAppliance::failing(), store);

        let (mode, result) = guard.run_pass(&key()).await;

        assert_eq!(mode, "delete");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_lookup_uses_lookup_mode() {
        let store = MockWorkloadStore::new()
            .with_record(record(true, false, &[]))
            .with_failing_reads();
        let guard = guard(CountingAppliance::default(), store);

        let (mode, result) = guard.run_pass(&key()).await;

        assert_eq!(mode, "lookup");
        assert!(result.is_err());
        assert_eq!(guard.forwarding().client().calls(), 0);
    }

    #[test]
    fn phase_mode_matches_outcome_mode() {
        let ensured = PassOutcome::Ensured {
            plan: ReconcilePlan::default(),
            finalizer_added: false,
        };
        let released = PassOutcome::Released {
            deleted: Vec::new(),
            finalizer_removed: false,
        };
        assert_eq!(WorkloadPhase::Present.mode(), ensured.mode());
        assert_eq!(WorkloadPhase::Terminating.mode(), released.mode());
    }
}
