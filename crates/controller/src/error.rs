//! 컨트롤러 에러 타입
//!
//! [`ControllerError`]는 조정 패스에서 발생하는 모든 에러를 표현합니다.
//! kube 런타임은 이 에러를 받으면 해당 Pod 키를 재시도 큐에 넣습니다.

use portfwd_core::error::{ConfigError, PortfwdError, WorkloadError};
use portfwd_forwarding::ForwardingError;

/// 컨트롤러 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// 어플라이언스 조정 실패
    #[error("forwarding failed: {0}")]
    Forwarding(#[from] ForwardingError),

    /// Kubernetes API 호출 실패
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// 워크로드 레코드가 사라짐
    #[error("workload not found: {0}")]
    WorkloadNotFound(String),

    /// 워크로드 레코드를 해석할 수 없음
    #[error("invalid workload '{key}': {reason}")]
    InvalidWorkload {
        /// 워크로드 키 (`namespace/name`)
        key: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ControllerError> for PortfwdError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Forwarding(e) => e.into(),
            ControllerError::Kube(e) => PortfwdError::Workload(WorkloadError::Api(e.to_string())),
            ControllerError::WorkloadNotFound(key) => {
                PortfwdError::Workload(WorkloadError::NotFound(key))
            }
            ControllerError::InvalidWorkload { key, reason } => {
                PortfwdError::Workload(WorkloadError::Invalid { key, reason })
            }
            ControllerError::Config { field, reason } => {
                PortfwdError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
