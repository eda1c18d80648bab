//! 설정 관리 -- portfwd.toml 파싱 및 런타임 설정
//!
//! [`PortfwdConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PORTFWD_UNIFI_PASSWORD=...` 형식)
//! 3. 설정 파일 (`portfwd.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), portfwd_core::error::PortfwdError> {
//! use portfwd_core::config::PortfwdConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PortfwdConfig::load("portfwd.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PortfwdConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PortfwdError};

/// 기본 어노테이션 도메인
pub const DEFAULT_DOMAIN: &str = "port-forward-controller.atte.cloud";

/// 설정 상한값 상수
const MAX_REQUEUE_SECS: u64 = 3600;
const MAX_APPLIANCE_TIMEOUT_SECS: u64 = 300;
const MAX_HEALTH_INTERVAL_SECS: u64 = 3600;

/// portfwd 통합 설정
///
/// `portfwd.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfwdConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨트롤러 설정
    #[serde(default)]
    pub controller: ControllerConfig,
    /// UniFi 어플라이언스 설정
    #[serde(default)]
    pub unifi: UnifiConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PortfwdConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PortfwdError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음, 검증 없음).
    ///
    /// 비밀번호처럼 환경변수로만 주입되는 값이 있으므로 검증은 [`load`](Self::load)에서 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PortfwdError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PortfwdError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PortfwdError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PortfwdError> {
        toml::from_str(toml_str).map_err(|e| {
            PortfwdError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PORTFWD_{SECTION}_{FIELD}`
    /// 예: `PORTFWD_UNIFI_BASE_URL=https://192.168.1.1`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PORTFWD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PORTFWD_GENERAL_LOG_FORMAT");

        // Controller
        override_string(&mut self.controller.domain, "PORTFWD_CONTROLLER_DOMAIN");
        override_string(&mut self.controller.namespace, "PORTFWD_CONTROLLER_NAMESPACE");
        override_u64(
            &mut self.controller.error_requeue_secs,
            "PORTFWD_CONTROLLER_ERROR_REQUEUE_SECS",
        );
        override_u64(
            &mut self.controller.appliance_timeout_secs,
            "PORTFWD_CONTROLLER_APPLIANCE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.controller.health_interval_secs,
            "PORTFWD_CONTROLLER_HEALTH_INTERVAL_SECS",
        );

        // UniFi
        override_string(&mut self.unifi.base_url, "PORTFWD_UNIFI_BASE_URL");
        override_string(&mut self.unifi.site, "PORTFWD_UNIFI_SITE");
        override_string(&mut self.unifi.username, "PORTFWD_UNIFI_USERNAME");
        override_string(&mut self.unifi.password, "PORTFWD_UNIFI_PASSWORD");
        override_bool(&mut self.unifi.insecure, "PORTFWD_UNIFI_INSECURE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "PORTFWD_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "PORTFWD_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "PORTFWD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PortfwdError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.controller.domain.is_empty() {
            return Err(invalid("controller.domain", "must not be empty".to_owned()));
        }
        if self.controller.domain.contains('/') {
            return Err(invalid(
                "controller.domain",
                "must not contain '/'".to_owned(),
            ));
        }

        if self.controller.error_requeue_secs == 0
            || self.controller.error_requeue_secs > MAX_REQUEUE_SECS
        {
            return Err(invalid(
                "controller.error_requeue_secs",
                format!("must be 1-{MAX_REQUEUE_SECS}"),
            ));
        }

        if self.controller.appliance_timeout_secs == 0
            || self.controller.appliance_timeout_secs > MAX_APPLIANCE_TIMEOUT_SECS
        {
            return Err(invalid(
                "controller.appliance_timeout_secs",
                format!("must be 1-{MAX_APPLIANCE_TIMEOUT_SECS}"),
            ));
        }

        if self.controller.health_interval_secs == 0
            || self.controller.health_interval_secs > MAX_HEALTH_INTERVAL_SECS
        {
            return Err(invalid(
                "controller.health_interval_secs",
                format!("must be 1-{MAX_HEALTH_INTERVAL_SECS}"),
            ));
        }

        if self.unifi.base_url.is_empty() {
            return Err(invalid("unifi.base_url", "must not be empty".to_owned()));
        }
        if !self.unifi.base_url.starts_with("http://") && !self.unifi.base_url.starts_with("https://")
        {
            return Err(invalid(
                "unifi.base_url",
                "must start with http:// or https://".to_owned(),
            ));
        }
        if self.unifi.site.is_empty() {
            return Err(invalid("unifi.site", "must not be empty".to_owned()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }

    /// 마커 어노테이션 키를 반환합니다 (`<domain>/enable`).
    pub fn marker_annotation(&self) -> String {
        format!("{}/enable", self.controller.domain)
    }

    /// finalizer 토큰을 반환합니다 (`finalizer.<domain>/v1`).
    pub fn finalizer_name(&self) -> String {
        format!("finalizer.{}/v1", self.controller.domain)
    }
}

fn invalid(field: &str, reason: String) -> PortfwdError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 컨트롤러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 어노테이션/finalizer 도메인
    pub domain: String,
    /// 감시할 네임스페이스 (빈 문자열이면 전체)
    pub namespace: String,
    /// 조정 실패 시 재시도 간격 (초)
    pub error_requeue_secs: u64,
    /// 어플라이언스 호출 1회당 타임아웃 (초)
    pub appliance_timeout_secs: u64,
    /// 상태 점검 로그 주기 (초)
    pub health_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_owned(),
            namespace: String::new(),
            error_requeue_secs: 30,
            appliance_timeout_secs: 15,
            health_interval_secs: 60,
        }
    }
}

/// UniFi 어플라이언스 설정
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiConfig {
    /// 컨트롤러 URL (예: `https://192.168.1.1`)
    pub base_url: String,
    /// 사이트 이름
    pub site: String,
    /// 로그인 사용자
    pub username: String,
    /// 로그인 비밀번호 (환경변수 `PORTFWD_UNIFI_PASSWORD` 권장)
    pub password: String,
    /// TLS 인증서 검증 생략 여부 (자체 서명 인증서용)
    pub insecure: bool,
}

impl Default for UnifiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://unifi:8443".to_owned(),
            site: "default".to_owned(),
            username: String::new(),
            password: String::new(),
            insecure: false,
        }
    }
}

// 비밀번호가 로그에 남지 않도록 Debug를 직접 구현
impl std::fmt::Debug for UnifiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiConfig")
            .field("base_url", &self.base_url)
            .field("site", &self.site)
            .field("username", &self.username)
            .field("password", &"***")
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 노출 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0".to_owned(),
            port: 9090,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
