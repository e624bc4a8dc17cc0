//! 감옥 관리자 설정
//!
//! [`JailManagerConfig`]는 core의 [`BaniqConfig`](baniq_core::config::BaniqConfig)에서
//! Docker/fail2ban 섹션을 모아 감옥 관리자 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use baniq_core::config::BaniqConfig;
//! use baniq_jail_manager::config::JailManagerConfig;
//!
//! let core_config = BaniqConfig::default();
//! let config = JailManagerConfig::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JailManagerError;

/// 설정 상한값 상수
const MAX_RELOAD_TIMEOUT_SECS: u64 = 600;
const MAX_RELOAD_RETRIES: u32 = 5;
const MAX_RELOAD_RETRY_BACKOFF_MS: u64 = 30_000;
const MAX_EVENT_BUFFER: usize = 65_536;

/// 감옥 관리자 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailManagerConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 감옥 파일 디렉토리
    pub jail_dir: PathBuf,
    /// 필터 파일 디렉토리
    pub filter_dir: PathBuf,
    /// `fail2ban-client` 실행 파일 경로
    pub client_path: String,
    /// 리로드 1회 시도 타임아웃 (초)
    pub reload_timeout_secs: u64,
    /// 리로드 실패 시 추가 시도 횟수
    pub reload_retries: u32,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 리로드 재시도 전 대기 시간 (밀리초)
    pub reload_retry_backoff_ms: u64,
    /// Docker 이벤트 버퍼 크기
    pub event_buffer: usize,
}

impl Default for JailManagerConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_owned(),
            jail_dir: PathBuf::from("/etc/fail2ban/jail.d"),
            filter_dir: PathBuf::from("/etc/fail2ban/filter.d"),
            client_path: "fail2ban-client".to_owned(),
            reload_timeout_secs: 30,
            reload_retries: 1,
            reload_retry_backoff_ms: 1_000,
            event_buffer: 256,
        }
    }
}

impl JailManagerConfig {
    /// core의 `BaniqConfig`에서 감옥 관리자 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &baniq_core::config::BaniqConfig) -> Self {
        Self {
            docker_socket: core.docker.socket.clone(),
            jail_dir: PathBuf::from(&core.fail2ban.jail_dir),
            filter_dir: PathBuf::from(&core.fail2ban.filter_dir),
            client_path: core.fail2ban.client_path.clone(),
            reload_timeout_secs: core.fail2ban.reload_timeout_secs,
            reload_retries: core.fail2ban.reload_retries,
            ..Self::default()
        }
    }

    /// 리로드 타임아웃을 `Duration`으로 반환합니다.
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    /// 리로드 재시도 대기 시간을 `Duration`으로 반환합니다.
    pub fn reload_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.reload_retry_backoff_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), JailManagerError> {
        if self.docker_socket.is_empty() {
            return Err(config_err("docker_socket", "must not be empty".to_owned()));
        }

        if self.jail_dir.as_os_str().is_empty() {
            return Err(config_err("jail_dir", "must not be empty".to_owned()));
        }

        if self.filter_dir.as_os_str().is_empty() {
            return Err(config_err("filter_dir", "must not be empty".to_owned()));
        }

        if self.client_path.is_empty() {
            return Err(config_err("client_path", "must not be empty".to_owned()));
        }

        if self.reload_timeout_secs == 0 || self.reload_timeout_secs > MAX_RELOAD_TIMEOUT_SECS {
            return Err(config_err(
                "reload_timeout_secs",
                format!("must be 1-{MAX_RELOAD_TIMEOUT_SECS}"),
            ));
        }

        if self.reload_retries > MAX_RELOAD_RETRIES {
            return Err(config_err(
                "reload_retries",
                format!("must be 0-{MAX_RELOAD_RETRIES}"),
            ));
        }

        if self.reload_retry_backoff_ms > MAX_RELOAD_RETRY_BACKOFF_MS {
            return Err(config_err(
                "reload_retry_backoff_ms",
                format!("must be 0-{MAX_RELOAD_RETRY_BACKOFF_MS}"),
            ));
        }

        if self.event_buffer == 0 || self.event_buffer > MAX_EVENT_BUFFER {
            return Err(config_err(
                "event_buffer",
                format!("must be 1-{MAX_EVENT_BUFFER}"),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: String) -> JailManagerError {
    JailManagerError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 감옥 관리자 설정 빌더
#[derive(Default)]
pub struct JailManagerConfigBuilder {
    config: JailManagerConfig,
}

impl JailManagerConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Docker 소켓 경로를 설정합니다.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = socket.into();
        self
    }

    /// 감옥 파일 디렉토리를 설정합니다.
    pub fn jail_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.jail_dir = dir.into();
        self
    }

    /// 필터 파일 디렉토리를 설정합니다.
    pub fn filter_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.filter_dir = dir.into();
        self
    }

    /// `fail2ban-client` 경로를 설정합니다.
    pub fn client_path(mut self, path: impl Into<String>) -> Self {
        self.config.client_path = path.into();
        self
    }

    /// 리로드 타임아웃(초)을 설정합니다.
    pub fn reload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.reload_timeout_secs = secs;
        self
    }

    /// 리로드 재시도 횟수를 설정합니다.
    pub fn reload_retries(mut self, retries: u32) -> Self {
        self.config.reload_retries = retries;
        self
    }

    /// 리로드 재시도 대기 시간(밀리초)을 설정합니다.
    pub fn reload_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.reload_retry_backoff_ms = ms;
        self
    }

    /// Docker 이벤트 버퍼 크기를 설정합니다.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    /// 설정을 검증하고 `JailManagerConfig`를 생성합니다.
    pub fn build(self) -> Result<JailManagerConfig, JailManagerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
