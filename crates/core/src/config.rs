//! 설정 관리 -- baniq.toml 파싱 및 런타임 설정
//!
//! [`BaniqConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BANIQ_FAIL2BAN_JAIL_DIR=/etc/fail2ban/jail.d` 형식)
//! 3. 설정 파일 (`baniq.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), baniq_core::error::BaniqError> {
//! use baniq_core::config::BaniqConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BaniqConfig::load("/etc/baniq/baniq.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BaniqConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BaniqError, ConfigError};

/// 리로드 타임아웃 상한 (초)
const MAX_RELOAD_TIMEOUT_SECS: u64 = 600;
/// 리로드 재시도 상한
const MAX_RELOAD_RETRIES: u32 = 5;

/// BanIQ 통합 설정
///
/// `baniq.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaniqConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// fail2ban 설정
    #[serde(default)]
    pub fail2ban: Fail2banConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BaniqConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BaniqError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드와 검증 없음).
    ///
    /// 검증은 [`load`](Self::load)가 오버라이드를 적용한 뒤 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BaniqError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BaniqError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BaniqError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BaniqError> {
        toml::from_str(toml_str).map_err(|e| {
            BaniqError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BANIQ_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BANIQ_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BANIQ_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "BANIQ_GENERAL_PID_FILE");

        // Docker
        override_string(&mut self.docker.socket, "BANIQ_DOCKER_SOCKET");

        // fail2ban
        override_string(&mut self.fail2ban.jail_dir, "BANIQ_FAIL2BAN_JAIL_DIR");
        override_string(&mut self.fail2ban.filter_dir, "BANIQ_FAIL2BAN_FILTER_DIR");
        override_string(
            &mut self.fail2ban.client_path,
            "BANIQ_FAIL2BAN_CLIENT_PATH",
        );
        override_u64(
            &mut self.fail2ban.reload_timeout_secs,
            "BANIQ_FAIL2BAN_RELOAD_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.fail2ban.reload_retries,
            "BANIQ_FAIL2BAN_RELOAD_RETRIES",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "BANIQ_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "BANIQ_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "BANIQ_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BaniqError> {
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

        if self.docker.socket.is_empty() {
            return Err(invalid("docker.socket", "must not be empty".to_owned()));
        }

        if self.fail2ban.jail_dir.is_empty() {
            return Err(invalid("fail2ban.jail_dir", "must not be empty".to_owned()));
        }

        if self.fail2ban.filter_dir.is_empty() {
            return Err(invalid(
                "fail2ban.filter_dir",
                "must not be empty".to_owned(),
            ));
        }

        if self.fail2ban.client_path.is_empty() {
            return Err(invalid(
                "fail2ban.client_path",
                "must not be empty".to_owned(),
            ));
        }

        if self.fail2ban.reload_timeout_secs == 0
            || self.fail2ban.reload_timeout_secs > MAX_RELOAD_TIMEOUT_SECS
        {
            return Err(invalid(
                "fail2ban.reload_timeout_secs",
                format!("must be 1-{MAX_RELOAD_TIMEOUT_SECS}"),
            ));
        }

        if self.fail2ban.reload_retries > MAX_RELOAD_RETRIES {
            return Err(invalid(
                "fail2ban.reload_retries",
                format!("must be 0-{MAX_RELOAD_RETRIES}"),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> BaniqError {
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
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로
    pub socket: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_owned(),
        }
    }
}

/// fail2ban 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fail2banConfig {
    /// 감옥 파일 디렉토리
    pub jail_dir: String,
    /// 필터 파일 디렉토리
    pub filter_dir: String,
    /// `fail2ban-client` 실행 파일 경로
    pub client_path: String,
    /// 리로드 1회 시도 타임아웃 (초)
    pub reload_timeout_secs: u64,
    /// 리로드 실패 시 추가 시도 횟수
    pub reload_retries: u32,
}

impl Default for Fail2banConfig {
    fn default() -> Self {
        Self {
            jail_dir: "/etc/fail2ban/jail.d".to_owned(),
            filter_dir: "/etc/fail2ban/filter.d".to_owned(),
            client_path: "fail2ban-client".to_owned(),
            reload_timeout_secs: 30,
            reload_retries: 1,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9101,
        }
    }
}

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

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
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
