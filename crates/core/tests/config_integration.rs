//! portfwd.toml 통합 설정 테스트
//!
//! - portfwd.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 파일 에러 테스트

use std::io::Write;

use portfwd_core::config::{DEFAULT_DOMAIN, PortfwdConfig};
use portfwd_core::error::{ConfigError, PortfwdError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../portfwd.toml.example");

// =============================================================================
// portfwd.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = PortfwdConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.controller.domain, DEFAULT_DOMAIN);
    assert!(config.controller.namespace.is_empty());
}

#[test]
fn example_config_passes_validation() {
    let config = PortfwdConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_expected_unifi_section() {
    let config = PortfwdConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.unifi.base_url, "https://unifi:8443");
    assert_eq!(config.unifi.site, "default");
    assert_eq!(config.unifi.username, "portfwd");
    assert!(config.unifi.password.is_empty());
    assert!(!config.unifi.insecure);
}

#[test]
fn example_config_derives_marker_and_finalizer() {
    let config = PortfwdConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(
        config.marker_annotation(),
        "port-forward-controller.atte.cloud/enable"
    );
    assert_eq!(
        config.finalizer_name(),
        "finalizer.port-forward-controller.atte.cloud/v1"
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn only_unifi_section_keeps_other_defaults() {
    let config = PortfwdConfig::parse(
        r#"
[unifi]
base_url = "https://10.0.0.1"
site = "lab"
"#,
    )
    .expect("should parse");

    assert_eq!(config.unifi.site, "lab");
    assert_eq!(config.controller.error_requeue_secs, 30);
    assert_eq!(config.metrics.port, 9090);
    config.validate().expect("partial config should validate");
}

#[test]
fn wrong_type_is_parse_error() {
    let err = PortfwdConfig::parse(
        r#"
[metrics]
port = "not-a-number"
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PortfwdError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 파일 로딩 + 환경변수 우선순위 테스트
// =============================================================================

#[tokio::test]
#[serial]
async fn load_applies_env_over_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(EXAMPLE.as_bytes()).expect("write");

    // SAFETY: serial_test로 환경변수를 만지는 테스트를 직렬화합니다.
    unsafe {
        std::env::set_var("PORTFWD_UNIFI_PASSWORD", "from-env");
        std::env::set_var("PORTFWD_CONTROLLER_NAMESPACE", "games");
    }

    let config = PortfwdConfig::load(file.path()).await;

    unsafe {
        std::env::remove_var("PORTFWD_UNIFI_PASSWORD");
        std::env::remove_var("PORTFWD_CONTROLLER_NAMESPACE");
    }

    let config = config.expect("load should succeed");
    assert_eq!(config.unifi.password, "from-env");
    assert_eq!(config.controller.namespace, "games");
    assert_eq!(config.unifi.site, "default");
}

#[tokio::test]
#[serial]
async fn load_rejects_env_override_that_breaks_validation() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(EXAMPLE.as_bytes()).expect("write");

    // SAFETY: serial_test로 환경변수를 만지는 테스트를 직렬화합니다.
    unsafe { std::env::set_var("PORTFWD_GENERAL_LOG_FORMAT", "xml") };
    let result = PortfwdConfig::load(file.path()).await;
    unsafe { std::env::remove_var("PORTFWD_GENERAL_LOG_FORMAT") };

    let err = result.unwrap_err();
    assert!(err.to_string().contains("log_format"));
}

#[tokio::test]
async fn load_missing_file_is_file_not_found() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = PortfwdConfig::load(dir.path().join("absent.toml"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PortfwdError::Config(ConfigError::FileNotFound { .. })
    ));
}
