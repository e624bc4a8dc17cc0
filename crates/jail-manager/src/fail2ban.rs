//! fail2ban 제어 -- `fail2ban-client` 호출 추상화
//!
//! [`Fail2banControl`] trait은 외부 fail2ban 데몬에 대한 `ping`/`reload`를
//! 추상화합니다. 프로덕션에서는 [`Fail2banClient`]가 `fail2ban-client`
//! 프로세스를 실행하고, 테스트에서는 mock 구현을 사용합니다.
//!
//! # 리로드 정책
//!
//! 각 시도는 `reload_timeout`으로 제한되며, 실패하거나 시간 초과되면
//! 고정 대기 후 `reload_retries`만큼 추가로 시도합니다.
//! 실패 에러에는 프로세스의 stdout/stderr가 포함됩니다.

use std::future::Future;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::JailManagerConfig;
use crate::error::JailManagerError;

/// fail2ban 데몬 제어 trait
pub trait Fail2banControl: Send + Sync + 'static {
    /// fail2ban 데몬이 응답하는지 확인합니다.
    fn ping(&self) -> impl Future<Output = Result<(), JailManagerError>> + Send;

    /// 감옥/필터 설정을 다시 읽도록 요청합니다.
    fn reload(&self) -> impl Future<Output = Result<(), JailManagerError>> + Send;
}

/// `fail2ban-client` 프로세스 기반 구현
#[derive(Debug, Clone)]
pub struct Fail2banClient {
    client_path: String,
    timeout: Duration,
    retries: u32,
    retry_backoff: Duration,
}

impl Fail2banClient {
    /// 실행 파일 경로와 시도당 타임아웃으로 생성합니다. 재시도는 1회입니다.
    pub fn new(client_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client_path: client_path.into(),
            timeout,
            retries: 1,
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// 감옥 관리자 설정에서 생성합니다.
    pub fn from_config(config: &JailManagerConfig) -> Self {
        Self {
            client_path: config.client_path.clone(),
            timeout: config.reload_timeout(),
            retries: config.reload_retries,
            retry_backoff: config.reload_retry_backoff(),
        }
    }

    /// 추가 재시도 횟수를 설정합니다.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// 재시도 전 대기 시간을 설정합니다.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// `fail2ban-client <subcommand>`를 한 번 실행합니다.
    async fn run(&self, subcommand: &str) -> Result<(), JailManagerError> {
        let child = Command::new(&self.client_path)
            .arg(subcommand)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_elapsed| JailManagerError::ReloadTimeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                JailManagerError::Reload(format!(
                    "failed to run {} {subcommand}: {e}",
                    self.client_path
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(JailManagerError::Reload(format!(
            "{} {subcommand} exited with {}: {}",
            self.client_path,
            output.status,
            combined.trim()
        )))
    }
}

impl Fail2banControl for Fail2banClient {
    async fn ping(&self) -> Result<(), JailManagerError> {
        self.run("ping").await
    }

    async fn reload(&self) -> Result<(), JailManagerError> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                warn!(
                    attempt = attempt,
                    backoff_ms = u64::try_from(self.retry_backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying fail2ban reload"
                );
                tokio::time::sleep(self.retry_backoff).await;
            }

            match self.run("reload").await {
                Ok(()) => {
                    metrics::counter!(
                        baniq_core::metrics::RELOADS_TOTAL,
                        baniq_core::metrics::LABEL_RESULT => "success"
                    )
                    .increment(1);
                    info!(attempt = attempt, "fail2ban reloaded");
                    return Ok(());
                }
                Err(e) => {
                    debug!(attempt = attempt, error = %e, "fail2ban reload attempt failed");
                    last_error = Some(e);
                }
            }
        }

        metrics::counter!(
            baniq_core::metrics::RELOADS_TOTAL,
            baniq_core::metrics::LABEL_RESULT => "failure"
        )
        .increment(1);

        Err(last_error
            .unwrap_or_else(|| JailManagerError::Reload("reload was not attempted".to_owned())))
    }
}

/// 테스트용 Mock fail2ban
///
/// 리로드 호출 횟수를 세고, 실패를 시뮬레이션할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockFail2ban {
    reloads: std::sync::atomic::AtomicUsize,
    fail_reload: std::sync::atomic::AtomicBool,
    fail_ping: bool,
}

#[cfg(test)]
impl MockFail2ban {
    /// 항상 성공하는 mock을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 리로드가 실패하도록 설정합니다.
    pub fn failing_reload(self) -> Self {
        self.set_fail_reload(true);
        self
    }

    /// ping이 실패하도록 설정합니다.
    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// 리로드 실패 여부를 실행 중에 바꿉니다.
    pub fn set_fail_reload(&self, fail: bool) {
        self.fail_reload
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// 지금까지의 리로드 호출 횟수
    pub fn reload_count(&self) -> usize {
        self.reloads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Fail2banControl for MockFail2ban {
    async fn ping(&self) -> Result<(), JailManagerError> {
        if self.fail_ping {
            return Err(JailManagerError::Reload("mock ping failure".to_owned()));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), JailManagerError> {
        self.reloads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_reload.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(JailManagerError::Reload("mock reload failure".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn fast(client: Fail2banClient) -> Fail2banClient {
        client.with_retry_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn reload_succeeds_on_zero_exit() {
        let client = fast(Fail2banClient::new("true", Duration::from_secs(5)));
        client.reload().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn reload_fails_on_non_zero_exit() {
        let client = fast(Fail2banClient::new("false", Duration::from_secs(5)));
        let err = client.reload().await.unwrap_err();
        assert!(matches!(err, JailManagerError::Reload(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_reload_error() {
        let client = fast(Fail2banClient::new(
            "/nonexistent/fail2ban-client",
            Duration::from_secs(5),
        ))
        .with_retries(0);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, JailManagerError::Reload(_)));
    }

    #[tokio::test]
    async fn failure_output_is_included_in_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "f2b",
            "echo \"ERROR  Failed to access socket path\" >&2\nexit 255",
        );
        let client = fast(Fail2banClient::new(script, Duration::from_secs(5))).with_retries(0);

        let err = client.reload().await.unwrap_err();
        assert!(err.to_string().contains("Failed to access socket path"));
    }

    #[tokio::test]
    async fn failed_reload_is_retried_once_by_default() {
        let dir = TempDir::new().unwrap();
        let calls = dir.path().join("calls");
        let script = write_script(
            dir.path(),
            "f2b",
            &format!("echo \"$1\" >> {}\nexit 1", calls.display()),
        );
        let client = fast(Fail2banClient::new(script, Duration::from_secs(5)));

        assert!(client.reload().await.is_err());
        let recorded = std::fs::read_to_string(&calls).unwrap();
        assert_eq!(recorded.lines().collect::<Vec<_>>(), vec!["reload", "reload"]);
    }

    #[tokio::test]
    async fn retry_count_is_configurable() {
        let dir = TempDir::new().unwrap();
        let calls = dir.path().join("calls");
        let script = write_script(
            dir.path(),
            "f2b",
            &format!("echo \"$1\" >> {}\nexit 1", calls.display()),
        );
        let client = fast(Fail2banClient::new(script, Duration::from_secs(5))).with_retries(3);

        assert!(client.reload().await.is_err());
        let recorded = std::fs::read_to_string(&calls).unwrap();
        assert_eq!(recorded.lines().count(), 4);
    }

    #[tokio::test]
    async fn hung_reload_times_out() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "f2b", "sleep 10");
        let client =
            fast(Fail2banClient::new(script, Duration::from_millis(200))).with_retries(0);

        let started = std::time::Instant::now();
        let err = client.reload().await.unwrap_err();
        assert!(matches!(err, JailManagerError::ReloadTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn from_config_uses_reload_settings() {
        let config = JailManagerConfig {
            client_path: "/usr/bin/fail2ban-client".to_owned(),
            reload_timeout_secs: 7,
            reload_retries: 2,
            reload_retry_backoff_ms: 250,
            ..Default::default()
        };
        let client = Fail2banClient::from_config(&config);
        assert_eq!(client.client_path, "/usr/bin/fail2ban-client");
        assert_eq!(client.timeout, Duration::from_secs(7));
        assert_eq!(client.retries, 2);
        assert_eq!(client.retry_backoff, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn mock_counts_reloads() {
        let mock = MockFail2ban::new();
        mock.reload().await.unwrap();
        mock.reload().await.unwrap();
        assert_eq!(mock.reload_count(), 2);

        mock.set_fail_reload(true);
        assert!(mock.reload().await.is_err());
        assert_eq!(mock.reload_count(), 3);
    }
}
