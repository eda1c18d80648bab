//! 포워딩 규칙 조정 엔진
//!
//! [`ForwardingReconciler`]는 원하는 규칙 집합과 어플라이언스의 실제 규칙 집합을 비교하여
//! 차이만큼만 삭제/생성 호출을 보냅니다. 조정 패스 사이에 상태를 캐시하지 않으며,
//! 실제 상태는 매번 어플라이언스에서 다시 읽습니다.
//!
//! # 조정 흐름
//!
//! ```text
//! ensure_addresses(desired)
//!   list() ─► plan(desired, actual) ─► delete(stale) ─► create(missing)
//!
//! delete_addresses(addresses)
//!   list() ─► 정확히 일치하는 실제 규칙만 ─► delete(...)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use portfwd_core::metrics as m;
use portfwd_core::types::ForwardRule;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::appliance::ApplianceClient;
use crate::config::ForwardingConfig;
use crate::error::ForwardingError;

/// 한 번의 조정에서 적용할 변경 내역
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    /// 삭제할 실제 규칙
    pub stale: Vec<ForwardRule>,
    /// 생성할 원하는 규칙
    pub missing: Vec<ForwardRule>,
}

impl ReconcilePlan {
    /// 변경할 것이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty()
    }
}

/// 원하는 규칙과 실제 규칙으로부터 조정 계획을 계산합니다.
///
/// - stale: 어떤 원하는 규칙의 이름으로 시작하는 이름을 가졌지만
///   어떤 원하는 규칙과도 정확히 일치하지 않는 실제 규칙.
///   이름이 관련 없는 다른 워크로드의 규칙은 건드리지 않습니다.
/// - missing: 정확히 일치하는 실제 규칙이 없고 주소가 비어 있지 않은 원하는 규칙.
///
/// 주소가 빈 원하는 규칙도 stale 판정에는 참여합니다.
pub fn plan(desired: &[ForwardRule], actual: &[ForwardRule]) -> ReconcilePlan {
    let stale = actual
        .iter()
        .filter(|rule| {
            desired.iter().any(|d| rule.name.starts_with(&d.name)) && !desired.contains(rule)
        })
        .cloned()
        .collect();

    let mut missing: Vec<ForwardRule> = Vec::new();
    for rule in desired {
        if rule.is_routable() && !actual.contains(rule) && !missing.contains(rule) {
            missing.push(rule.clone());
        }
    }

    ReconcilePlan { stale, missing }
}

/// 요청된 규칙 중 실제로 존재하는 것만 골라냅니다 (정확한 값 일치).
pub fn existing_matches(requested: &[ForwardRule], actual: &[ForwardRule]) -> Vec<ForwardRule> {
    actual
        .iter()
        .filter(|rule| requested.contains(rule))
        .cloned()
        .collect()
}

/// 포워딩 규칙 조정기
///
/// 어플라이언스 호출은 순차적으로 실행되며 각 호출에 제한 시간이 걸립니다.
/// 같은 워크로드에 대한 패스의 직렬화는 호출 측(컨트롤러 런타임)이 보장합니다.
pub struct ForwardingReconciler<A> {
    client: Arc<A>,
    call_timeout: Duration,
}

impl<A> Clone for ForwardingReconciler<A> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            call_timeout: self.call_timeout,
        }
    }
}

impl<A: ApplianceClient> ForwardingReconciler<A> {
    /// 새 조정기를 생성합니다.
    pub fn new(client: Arc<A>, config: &ForwardingConfig) -> Self {
        Self::with_timeout(client, config.call_timeout())
    }

    /// 호출 제한 시간을 직접 지정하여 조정기를 생성합니다.
    pub fn with_timeout(client: Arc<A>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// 내부 어플라이언스 클라이언트를 반환합니다.
    pub fn client(&self) -> &Arc<A> {
        &self.client
    }

    /// 원하는 규칙 집합으로 수렴시킵니다.
    ///
    /// 오래된 규칙을 먼저 삭제한 뒤 누락된 규칙을 생성합니다. 삭제 후 생성이
    /// 실패하면 규칙이 빠진 상태로 남지만 다음 패스에서 다시 수렴합니다.
    /// 적용한 계획을 반환합니다.
    pub async fn ensure_addresses(
        &self,
        desired: &[ForwardRule],
    ) -> Result<ReconcilePlan, ForwardingError> {
        let actual = self.call("list", self.client.list()).await?;
        let plan = plan(desired, &actual);

        if plan.is_empty() {
            debug!(desired = desired.len(), "forwarding rules already converged");
            return Ok(plan);
        }

        if !plan.stale.is_empty() {
            for rule in &plan.stale {
                info!(rule = %rule, "deleting stale forwarding rule");
            }
            self.call("delete", self.client.delete(&plan.stale)).await?;
            counter!(m::FORWARDING_RULES_DELETED_TOTAL).increment(plan.stale.len() as u64);
        }

        if !plan.missing.is_empty() {
            for rule in &plan.missing {
                info!(rule = %rule, "creating forwarding rule");
            }
            self.call("create", self.client.create(&plan.missing))
                .await?;
            counter!(m::FORWARDING_RULES_CREATED_TOTAL).increment(plan.missing.len() as u64);
        }

        Ok(plan)
    }

    /// 주어진 규칙과 정확히 일치하는 실제 규칙만 삭제합니다.
    ///
    /// 이미 없는 규칙은 조용히 무시합니다. 삭제한 규칙을 반환합니다.
    pub async fn delete_addresses(
        &self,
        addresses: &[ForwardRule],
    ) -> Result<Vec<ForwardRule>, ForwardingError> {
        let actual = self.call("list", self.client.list()).await?;
        let to_delete = existing_matches(addresses, &actual);

        if to_delete.is_empty() {
            debug!(requested = addresses.len(), "no forwarding rules left to delete");
            return Ok(to_delete);
        }

        for rule in &to_delete {
            info!(rule = %rule, "deleting forwarding rule");
        }
        self.call("delete", self.client.delete(&to_delete)).await?;
        counter!(m::FORWARDING_RULES_DELETED_TOTAL).increment(to_delete.len() as u64);

        Ok(to_delete)
    }

    /// 어플라이언스를 변경하지 않고 조정 계획만 계산합니다.
    pub async fn preview(&self, desired: &[ForwardRule]) -> Result<ReconcilePlan, ForwardingError> {
        let actual = self.call("list", self.client.list()).await?;
        Ok(plan(desired, &actual))
    }

    /// 어플라이언스의 현재 규칙 목록을 반환합니다.
    pub async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
        self.call("list", self.client.list()).await
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, ForwardingError>>,
    ) -> Result<T, ForwardingError> {
        let result = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ForwardingError::Timeout {
                operation: operation.to_owned(),
                secs: self.call_timeout.as_secs(),
            }),
        };

        if let Err(e) = &result {
            warn!(operation, error = %e, "appliance call failed");
            counter!(m::FORWARDING_APPLIANCE_ERRORS_TOTAL, m::LABEL_OPERATION => operation)
                .increment(1);
        }
        result
    }
}
