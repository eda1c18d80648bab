//! 포워딩 에러 타입
//!
//! [`ForwardingError`]는 어플라이언스 호출과 조정 엔진에서 발생하는 모든 에러를 표현합니다.
//! `From<ForwardingError> for PortfwdError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use portfwd_core::error::{ApplianceError, ConfigError, PortfwdError};

/// 포워딩 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ForwardingError {
    /// 어플라이언스 연결 실패 (네트워크, TLS, HTTP 전송)
    #[error("appliance connection error: {0}")]
    ApplianceConnection(String),

    /// 어플라이언스 로그인 실패
    #[error("appliance authentication error: {0}")]
    ApplianceAuth(String),

    /// 어플라이언스가 에러 응답을 반환
    #[error("appliance api error: {0}")]
    ApplianceApi(String),

    /// 어플라이언스가 보고한 규칙을 해석할 수 없음
    #[error("invalid rule '{name}': {reason}")]
    InvalidRule {
        /// 규칙 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 어플라이언스 호출이 제한 시간 내에 끝나지 않음
    #[error("appliance {operation} timed out after {secs}s")]
    Timeout {
        /// 작업 이름 (list, create, delete)
        operation: String,
        /// 제한 시간 (초)
        secs: u64,
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

impl From<ForwardingError> for PortfwdError {
    fn from(err: ForwardingError) -> Self {
        match err {
            ForwardingError::ApplianceConnection(msg) => {
                PortfwdError::Appliance(ApplianceError::Connection(msg))
            }
            ForwardingError::ApplianceAuth(msg) => PortfwdError::Appliance(ApplianceError::Auth(msg)),
            ForwardingError::ApplianceApi(msg) => PortfwdError::Appliance(ApplianceError::Api(msg)),
            err @ ForwardingError::InvalidRule { .. } => {
                PortfwdError::Appliance(ApplianceError::Api(err.to_string()))
            }
            err @ ForwardingError::Timeout { .. } => {
                PortfwdError::Appliance(ApplianceError::Timeout(err.to_string()))
            }
            ForwardingError::Config { field, reason } => {
                PortfwdError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
