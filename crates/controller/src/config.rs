//! 컨트롤러 설정
//!
//! [`ControllerSettings`]는 core의 [`ControllerConfig`](portfwd_core::config::ControllerConfig)에서
//! 런타임이 쓰는 값만 골라 타입을 정리한 것입니다.

use std::time::Duration;

use portfwd_core::config::PortfwdConfig;

use crate::error::ControllerError;

const MAX_REQUEUE_SECS: u64 = 3600;

/// 컨트롤러 런타임 설정
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// 어노테이션/finalizer 도메인
    pub domain: String,
    /// 감시할 네임스페이스 (`None`이면 전체)
    pub namespace: Option<String>,
    /// 조정 실패 시 재시도 간격
    pub error_requeue: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            domain: portfwd_core::config::DEFAULT_DOMAIN.to_owned(),
            namespace: None,
            error_requeue: Duration::from_secs(30),
        }
    }
}

impl ControllerSettings {
    /// core 설정에서 컨트롤러 설정을 생성합니다.
    pub fn from_core(core: &PortfwdConfig) -> Self {
        let namespace = Some(core.controller.namespace.trim())
            .filter(|ns| !ns.is_empty())
            .map(str::to_owned);
        Self {
            domain: core.controller.domain.clone(),
            namespace,
            error_requeue: Duration::from_secs(core.controller.error_requeue_secs),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.domain.is_empty() || self.domain.contains('/') {
            return Err(ControllerError::Config {
                field: "domain".to_owned(),
                reason: "must be a non-empty name without '/'".to_owned(),
            });
        }

        let secs = self.error_requeue.as_secs();
        if secs == 0 || secs > MAX_REQUEUE_SECS {
            return Err(ControllerError::Config {
                field: "error_requeue_secs".to_owned(),
                reason: format!("must be 1-{MAX_REQUEUE_SECS}"),
            });
        }

        Ok(())
    }
}
