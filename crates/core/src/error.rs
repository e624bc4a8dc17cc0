//! 에러 타입 -- 도메인별 에러 정의

/// BanIQ 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BaniqError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 감옥(jail) 관리 에러
    #[error("jail error: {0}")]
    Jail(#[from] JailError),

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

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 감옥 관리 에러
///
/// `baniq-jail-manager` 크레이트의 도메인 에러가 이 타입으로 변환됩니다.
#[derive(Debug, thiserror::Error)]
pub enum JailError {
    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 감옥/필터 파일 입출력 실패
    #[error("file error: {0}")]
    File(String),

    /// fail2ban 리로드 실패
    #[error("reload failed: {0}")]
    Reload(String),

    /// 이벤트 구독 실패
    #[error("event stream failed: {0}")]
    EventStream(String),
}
