//! 파이프라인 trait -- 데몬이 관리하는 모듈의 생명주기 정의

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::PortfwdError;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 데몬이 시작/정지/상태 확인을 수행하는 모듈 trait
///
/// ```text
/// Initialized → start() → Running → stop() → Stopped
/// ```
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 이미 실행 중이면 `PipelineError::AlreadyRunning`.
    fn start(&mut self) -> impl Future<Output = Result<(), PortfwdError>> + Send;

    /// 모듈을 정지합니다. 실행 중이 아니면 `PipelineError::NotRunning`.
    fn stop(&mut self) -> impl Future<Output = Result<(), PortfwdError>> + Send;

    /// 모듈의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
