//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `portfwd_`
//! - 모듈명: `reconcile_`, `forwarding_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 조정 모드 레이블 키 (ensure, delete, ignored, gone)
pub const LABEL_MODE: &str = "mode";

/// 어플라이언스 작업 레이블 키 (list, create, delete)
pub const LABEL_OPERATION: &str = "operation";

// ─── Reconcile 메트릭 ───────────────────────────────────────────────

/// Reconcile: 실행된 조정 패스 수 (counter, labels: mode, result)
pub const RECONCILE_PASSES_TOTAL: &str = "portfwd_reconcile_passes_total";

/// Reconcile: 조정 패스 소요 시간 (histogram, 초)
pub const RECONCILE_DURATION_SECONDS: &str = "portfwd_reconcile_duration_seconds";

/// Reconcile: finalizer 추가/제거 수 (counter, label: mode)
pub const RECONCILE_FINALIZER_UPDATES_TOTAL: &str = "portfwd_reconcile_finalizer_updates_total";

// ─── Forwarding 메트릭 ─────────────────────────────────────────────

/// Forwarding: 생성된 규칙 수 (counter)
pub const FORWARDING_RULES_CREATED_TOTAL: &str = "portfwd_forwarding_rules_created_total";

/// Forwarding: 삭제된 규칙 수 (counter)
pub const FORWARDING_RULES_DELETED_TOTAL: &str = "portfwd_forwarding_rules_deleted_total";

/// Forwarding: 어플라이언스 호출 실패 수 (counter, label: operation)
pub const FORWARDING_APPLIANCE_ERRORS_TOTAL: &str = "portfwd_forwarding_appliance_errors_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "portfwd_daemon_uptime_seconds";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 조정 패스 소요 시간 히스토그램 버킷 (초)
///
/// 어플라이언스 HTTP 왕복이 포함되므로 10ms ~ 30s 범위
pub const RECONCILE_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        RECONCILE_PASSES_TOTAL,
        "Total number of workload reconcile passes by mode and result"
    );
    describe_histogram!(
        RECONCILE_DURATION_SECONDS,
        "Time to complete a single workload reconcile pass in seconds"
    );
    describe_counter!(
        RECONCILE_FINALIZER_UPDATES_TOTAL,
        "Total number of finalizer attach/detach writes"
    );

    describe_counter!(
        FORWARDING_RULES_CREATED_TOTAL,
        "Total number of port forwarding rules created on the appliance"
    );
    describe_counter!(
        FORWARDING_RULES_DELETED_TOTAL,
        "Total number of port forwarding rules deleted from the appliance"
    );
    describe_counter!(
        FORWARDING_APPLIANCE_ERRORS_TOTAL,
        "Total number of failed appliance calls by operation"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "portfwd daemon uptime in seconds");
}
