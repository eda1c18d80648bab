//! 에러 타입 -- 도메인별 에러 정의

/// portfwd 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PortfwdError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인(모듈 생명주기) 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 네트워크 어플라이언스 에러
    #[error("appliance error: {0}")]
    Appliance(#[from] ApplianceError),

    /// 워크로드(Pod) 조회/갱신 에러
    #[error("workload error: {0}")]
    Workload(#[from] WorkloadError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 어플라이언스 에러
#[derive(Debug, thiserror::Error)]
pub enum ApplianceError {
    /// 연결 실패 (네트워크, TLS)
    #[error("connection failed: {0}")]
    Connection(String),

    /// 인증 실패
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API 호출 실패
    #[error("api call failed: {0}")]
    Api(String),

    /// 호출 시간 초과
    #[error("call timed out: {0}")]
    Timeout(String),
}

/// 워크로드 에러
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// 워크로드를 찾을 수 없음
    #[error("workload not found: {0}")]
    NotFound(String),

    /// Kubernetes API 호출 실패
    #[error("kubernetes api error: {0}")]
    Api(String),

    /// 워크로드 명세가 유효하지 않음
    #[error("invalid workload '{key}': {reason}")]
    Invalid { key: String, reason: String },
}
