//! 포워딩 설정
//!
//! [`ForwardingConfig`]는 core의 [`UnifiConfig`](portfwd_core::config::UnifiConfig)와
//! [`ControllerConfig`](portfwd_core::config::ControllerConfig)에서
//! 어플라이언스 접속 정보와 호출 타임아웃을 모아 옵니다.
//!
//! # 사용 예시
//! ```ignore
//! use portfwd_core::config::PortfwdConfig;
//! use portfwd_forwarding::config::ForwardingConfig;
//!
//! let core_config = PortfwdConfig::default();
//! let config = ForwardingConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use portfwd_core::config::PortfwdConfig;

use crate::error::ForwardingError;

/// 호출 타임아웃 상한 (초)
const MAX_CALL_TIMEOUT_SECS: u64 = 300;

/// 포워딩 설정
#[derive(Clone)]
pub struct ForwardingConfig {
    /// UniFi 컨트롤러 URL
    pub base_url: String,
    /// 사이트 이름
    pub site: String,
    /// 로그인 사용자
    pub username: String,
    /// 로그인 비밀번호
    pub password: String,
    /// TLS 인증서 검증 생략 여부
    pub insecure: bool,
    /// 어플라이언스 호출 1회당 타임아웃 (초)
    pub call_timeout_secs: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://unifi:8443".to_owned(),
            site: "default".to_owned(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            call_timeout_secs: 15,
        }
    }
}

impl std::fmt::Debug for ForwardingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingConfig")
            .field("base_url", &self.base_url)
            .field("site", &self.site)
            .field("username", &self.username)
            .field("password", &"***")
            .field("insecure", &self.insecure)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .finish()
    }
}

impl ForwardingConfig {
    /// core 설정에서 포워딩 설정을 생성합니다.
    pub fn from_core(core: &PortfwdConfig) -> Self {
        Self {
            base_url: core.unifi.base_url.clone(),
            site: core.unifi.site.clone(),
            username: core.unifi.username.clone(),
            password: core.unifi.password.clone(),
            insecure: core.unifi.insecure,
            call_timeout_secs: core.controller.appliance_timeout_secs,
        }
    }

    /// 어플라이언스 호출 타임아웃을 반환합니다.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ForwardingError> {
        if self.call_timeout_secs == 0 || self.call_timeout_secs > MAX_CALL_TIMEOUT_SECS {
            return Err(ForwardingError::Config {
                field: "call_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_CALL_TIMEOUT_SECS}"),
            });
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ForwardingError::Config {
                field: "base_url".to_owned(),
                reason: "must start with http:// or https://".to_owned(),
            });
        }

        if self.site.is_empty() {
            return Err(ForwardingError::Config {
                field: "site".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        // 사이트 이름은 URL 경로에 그대로 들어갑니다
        if self.site.contains('/') {
            return Err(ForwardingError::Config {
                field: "site".to_owned(),
                reason: "must not contain '/'".to_owned(),
            });
        }

        Ok(())
    }
}

/// 포워딩 설정 빌더
#[derive(Default)]
pub struct ForwardingConfigBuilder {
    config: ForwardingConfig,
}

impl ForwardingConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 컨트롤러 URL을 설정합니다.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// 사이트 이름을 설정합니다.
    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.config.site = site.into();
        self
    }

    /// 로그인 정보를 설정합니다.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// TLS 검증 생략 여부를 설정합니다.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    /// 호출 타임아웃(초)을 설정합니다.
    pub fn call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.call_timeout_secs = secs;
        self
    }

    /// 설정을 검증하고 `ForwardingConfig`를 생성합니다.
    pub fn build(self) -> Result<ForwardingConfig, ForwardingError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ForwardingConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_copies_unifi_and_timeout() {
        let mut core = PortfwdConfig::default();
        core.unifi.base_url = "https://10.0.0.1".to_owned();
        core.unifi.site = "home".to_owned();
        core.unifi.insecure = true;
        core.controller.appliance_timeout_secs = 7;

        let config = ForwardingConfig::from_core(&core);
        assert_eq!(config.base_url, "https://10.0.0.1");
        assert_eq!(config.site, "home");
        assert!(config.insecure);
        assert_eq!(config.call_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ForwardingConfigBuilder::new()
            .call_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("call_timeout_secs"));
    }

    #[test]
    fn builder_rejects_site_with_slash() {
        let result = ForwardingConfigBuilder::new().site("a/b").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_url_without_scheme() {
        let result = ForwardingConfigBuilder::new().base_url("unifi:8443").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_sets_all_fields() {
        let config = ForwardingConfigBuilder::new()
            .base_url("https://gw.lan")
            .site("lab")
            .credentials("admin", "pw")
            .insecure(true)
            .call_timeout_secs(3)
            .build()
            .unwrap();
        assert_eq!(config.base_url, "https://gw.lan");
        assert_eq!(config.site, "lab");
        assert_eq!(config.username, "admin");
        assert!(config.insecure);
        assert_eq!(config.call_timeout_secs, 3);
    }

    #[test]
    fn debug_redacts_password() {
        let config = ForwardingConfigBuilder::new()
            .credentials("admin", "hunter2")
            .build()
            .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
