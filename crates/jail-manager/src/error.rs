//! 감옥 관리자 에러 타입
//!
//! [`JailManagerError`]는 감옥 관리자 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<JailManagerError> for BaniqError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use baniq_core::error::{BaniqError, JailError};

/// 감옥 관리자 도메인 에러
///
/// Docker API 호출, 감옥/필터 파일 입출력, fail2ban 리로드,
/// 이벤트 구독, 설정 에러 등을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum JailManagerError {
    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 감옥 파일 쓰기 실패
    #[error("failed to write jail file {path}: {reason}")]
    JailWrite {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 감옥 파일 삭제 실패
    #[error("failed to remove jail file {path}: {reason}")]
    JailRemove {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 커스텀 필터 파일 쓰기 실패
    #[error("failed to write filter file {path}: {reason}")]
    FilterWrite {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// fail2ban 명령 실패 (출력 포함)
    #[error("fail2ban command failed: {0}")]
    Reload(String),

    /// fail2ban 명령 타임아웃
    #[error("fail2ban command timed out after {timeout_secs}s")]
    ReloadTimeout {
        /// 적용된 타임아웃 (초)
        timeout_secs: u64,
    },

    /// 이벤트 구독 실패
    #[error("event stream error: {0}")]
    EventStream(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<JailManagerError> for BaniqError {
    fn from(err: JailManagerError) -> Self {
        match &err {
            JailManagerError::DockerApi(_)
            | JailManagerError::DockerConnection(_)
            | JailManagerError::ContainerNotFound(_) => {
                BaniqError::Jail(JailError::DockerApi(err.to_string()))
            }
            JailManagerError::JailWrite { .. }
            | JailManagerError::JailRemove { .. }
            | JailManagerError::FilterWrite { .. } => {
                BaniqError::Jail(JailError::File(err.to_string()))
            }
            JailManagerError::Reload(_) | JailManagerError::ReloadTimeout { .. } => {
                BaniqError::Jail(JailError::Reload(err.to_string()))
            }
            JailManagerError::EventStream(msg) => {
                BaniqError::Jail(JailError::EventStream(msg.clone()))
            }
            JailManagerError::Config { field, reason } => {
                BaniqError::Config(baniq_core::error::ConfigError::InvalidValue {
                    field: field.clone(),
                    reason: reason.clone(),
                })
            }
        }
    }
}
