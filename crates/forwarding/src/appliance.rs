//! Network appliance abstraction for testability.
//!
//! The [`ApplianceClient`] trait abstracts the forwarding-rule API of a single
//! appliance site. Production code uses [`UnifiClient`](crate::unifi::UnifiClient)
//! while tests use `MockApplianceClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ForwardingReconciler │
//! └──────────┬───────────┘
//!            │
//!            ▼
//!   ┌────────────────┐
//!   │ApplianceClient │ (trait)
//!   └────────────────┘
//!        │       │
//!        ▼       ▼
//!   ┌───────┐ ┌──────┐
//!   │ UniFi │ │ Mock │
//!   └───┬───┘ └──────┘
//!       │
//!       ▼
//!   UniFi Network controller
//! ```

use std::future::Future;
use std::sync::Arc;

use portfwd_core::types::ForwardRule;

use crate::error::ForwardingError;

/// Trait abstracting forwarding-rule operations on one appliance site.
///
/// Rules are addressed purely by value. Implementations that need an internal
/// identifier (e.g. a database id) rediscover it from the rule's fields.
///
/// # Batch semantics
///
/// `create` and `delete` apply each rule independently and stop at the first
/// failure. Rules applied before the failure stay applied; there is no rollback.
pub trait ApplianceClient: Send + Sync + 'static {
    /// Lists the single-port forwarding rules currently held by the appliance.
    ///
    /// Rules whose forwarded port is a range are not part of the result.
    fn list(&self) -> impl Future<Output = Result<Vec<ForwardRule>, ForwardingError>> + Send;

    /// Creates every rule in `rules`, in order.
    fn create(
        &self,
        rules: &[ForwardRule],
    ) -> impl Future<Output = Result<(), ForwardingError>> + Send;

    /// Deletes every appliance entry equal to a rule in `rules`, in order.
    fn delete(
        &self,
        rules: &[ForwardRule],
    ) -> impl Future<Output = Result<(), ForwardingError>> + Send;
}

impl<T: ApplianceClient> ApplianceClient for Arc<T> {
    fn list(&self) -> impl Future<Output = Result<Vec<ForwardRule>, ForwardingError>> + Send {
        self.as_ref().list()
    }

    fn create(
        &self,
        rules: &[ForwardRule],
    ) -> impl Future<Output = Result<(), ForwardingError>> + Send {
        self.as_ref().create(rules)
    }

    fn delete(
        &self,
        rules: &[ForwardRule],
    ) -> impl Future<Output = Result<(), ForwardingError>> + Send {
        self.as_ref().delete(rules)
    }
}

/// 테스트용 Mock 어플라이언스 클라이언트
///
/// 규칙 목록을 메모리에 보관하고 모든 호출을 기록합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockApplianceClient {
    rules: std::sync::Mutex<Vec<ForwardRule>>,
    calls: std::sync::Mutex<Vec<MockCall>>,
    fail_create: bool,
    fail_list: bool,
    delay: Option<std::time::Duration>,
}

/// Mock에 기록된 호출
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    List,
    Create(Vec<ForwardRule>),
    Delete(Vec<ForwardRule>),
}

#[cfg(test)]
impl MockApplianceClient {
    /// 빈 규칙 목록으로 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 규칙을 설정합니다.
    pub fn with_rules(self, rules: Vec<ForwardRule>) -> Self {
        *self.rules.lock().expect("mock lock") = rules;
        self
    }

    /// create 호출 시 실패하도록 설정합니다.
    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// list 호출 시 실패하도록 설정합니다.
    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// 모든 호출 전에 지연을 둡니다.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 현재 규칙 목록을 반환합니다.
    pub fn rules(&self) -> Vec<ForwardRule> {
        self.rules.lock().expect("mock lock").clone()
    }

    /// 기록된 호출 목록을 반환합니다.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("mock lock").clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
impl ApplianceClient for MockApplianceClient {
    async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
        self.pause().await;
        self.calls.lock().expect("mock lock").push(MockCall::List);
        if self.fail_list {
            return Err(ForwardingError::ApplianceConnection(
                "mock failure".to_owned(),
            ));
        }
        Ok(self.rules())
    }

    async fn create(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        self.pause().await;
        self.calls
            .lock()
            .expect("mock lock")
            .push(MockCall::Create(rules.to_vec()));
        if self.fail_create {
            return Err(ForwardingError::ApplianceApi("mock failure".to_owned()));
        }
        self.rules
            .lock()
            .expect("mock lock")
            .extend(rules.iter().cloned());
        Ok(())
    }

    async fn delete(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        self.pause().await;
        self.calls
            .lock()
            .expect("mock lock")
            .push(MockCall::Delete(rules.to_vec()));
        self.rules
            .lock()
            .expect("mock lock")
            .retain(|existing| !rules.contains(existing));
        Ok(())
    }
}
