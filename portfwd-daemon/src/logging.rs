//! 데몬 로깅 초기화
//!
//! `[general].log_level`은 portfwd 크레이트에만 적용됩니다. kube 런타임과
//! HTTP/TLS 스택은 설정 레벨이 더 낮더라도 warn 이상만 기록합니다.
//! `RUST_LOG`가 설정되어 있으면 그 값을 그대로 사용합니다.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use portfwd_core::config::GeneralConfig;

/// 설정 레벨을 그대로 따르는 크레이트
const PORTFWD_TARGETS: &[&str] = &[
    "portfwd_core",
    "portfwd_forwarding",
    "portfwd_controller",
    "portfwd_daemon",
];

/// 설정 레벨과 무관하게 조용히 두는 의존 크레이트 (`kube`는 `kube_runtime`, `kube_client`도 포함)
const DEPENDENCY_TARGETS: &[&str] = &["kube", "hyper", "hyper_util", "h2", "tower", "reqwest", "rustls"];

/// 로그 출력 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines (운영 기본값)
    Json,
    /// 사람이 읽기 쉬운 출력 (개발용)
    Pretty,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            )),
        }
    }
}

/// 설정 레벨에서 크레이트별 필터 지시문을 만듭니다.
///
/// 의존 크레이트와 그 밖의 타깃은 `min(level, warn)`을 받습니다.
pub fn filter_directives(level: LevelFilter) -> String {
    let own = level.to_string().to_ascii_lowercase();
    let quiet = level.min(LevelFilter::WARN).to_string().to_ascii_lowercase();

    std::iter::once(quiet.clone())
        .chain(PORTFWD_TARGETS.iter().map(|t| format!("{t}={own}")))
        .chain(DEPENDENCY_TARGETS.iter().map(|t| format!("{t}={quiet}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// 설정된 레벨로 필터를 만듭니다. `RUST_LOG`가 있으면 우선합니다.
pub fn build_filter(config: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    level_filter(&config.log_level)
}

fn level_filter(log_level: &str) -> Result<EnvFilter> {
    let level = LevelFilter::from_str(log_level.trim())
        .with_context(|| format!("invalid log level '{log_level}'"))?;
    EnvFilter::try_new(filter_directives(level))
        .with_context(|| format!("invalid log level '{log_level}'"))
}

/// 전역 tracing subscriber를 설치합니다.
///
/// 트레이싱 매크로가 쓰이기 전에 한 번만 호출해야 합니다.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    match format {
        LogFormat::Json => registry.with(tracing_fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_fmt::layer().pretty()).try_init(),
    }
    .map_err(|e| anyhow!("failed to initialize {format} tracing subscriber: {e}"))
}
