//! 감옥 가드 오케스트레이터 -- 이벤트 디스패처 생명주기 관리
//!
//! [`JailGuard`]는 core의 [`Pipeline`] trait을 구현하여
//! `baniq-daemon`에서 시작/정지/헬스 체크됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! Docker events ──> EventDispatcher (task) ──> JailManager ──> jail.d / filter.d
//!                          |                        |
//!                   fatal error ──oneshot──> daemon  └──> fail2ban-client reload
//! ```

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use baniq_core::error::{BaniqError, PipelineError};
use baniq_core::pipeline::{HealthStatus, Pipeline};

use crate::config::JailManagerConfig;
use crate::dispatcher::EventDispatcher;
use crate::docker::DockerClient;
use crate::error::JailManagerError;
use crate::fail2ban::Fail2banControl;
use crate::manager::JailManager;

/// 가드 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum GuardState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 감옥 가드 -- Docker 이벤트 구독, 기존 컨테이너 조정, 감옥 생성/삭제를 관리합니다.
///
/// # 사용 예시
/// ```ignore
/// use baniq_jail_manager::JailGuardBuilder;
///
/// let (mut guard, fatal_rx) = JailGuardBuilder::new()
///     .config(config)
///     .docker_client(docker)
///     .fail2ban(fail2ban)
///     .build()?;
///
/// guard.start().await?;
/// ```
pub struct JailGuard<D: DockerClient, F: Fail2banControl> {
    /// 현재 상태
    state: GuardState,
    /// Docker 클라이언트 (공유)
    docker: Arc<D>,
    /// 감옥 관리자 (디스패처와 공유)
    manager: Arc<JailManager<F>>,
    /// 디스패처 취소 토큰
    cancel: CancellationToken,
    /// 치명적 에러 전달 채널 (start에서 소비)
    fatal_tx: Option<oneshot::Sender<JailManagerError>>,
    /// 디스패처 태스크 핸들
    task: Option<tokio::task::JoinHandle<()>>,
}

impl<D: DockerClient, F: Fail2banControl> JailGuard<D, F> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            GuardState::Initialized => "initialized",
            GuardState::Running => "running",
            GuardState::Stopped => "stopped",
        }
    }

    /// 감옥 관리자에 대한 Arc 참조를 반환합니다.
    pub fn manager(&self) -> Arc<JailManager<F>> {
        Arc::clone(&self.manager)
    }

    /// 감옥을 소유한 컨테이너 수를 반환합니다.
    pub async fn tracked_container_count(&self) -> usize {
        self.manager.tracked_containers().await.len()
    }

    fn dispatcher_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl<D: DockerClient, F: Fail2banControl> Pipeline for JailGuard<D, F> {
    async fn start(&mut self) -> Result<(), BaniqError> {
        if self.state == GuardState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting jail guard");

        // 1. Docker 연결 확인 (실패 시 시작 불가)
        self.docker.ping().await.map_err(|e| {
            BaniqError::Pipeline(PipelineError::InitFailed(format!(
                "docker daemon not available: {e}"
            )))
        })?;

        // 2. 디스패처 태스크 스폰
        let fatal_tx = self.fatal_tx.take().ok_or(BaniqError::Pipeline(
            PipelineError::InitFailed(
                "fatal channel not available (was it consumed by a previous start? rebuild the guard to restart)".to_owned(),
            ),
        ))?;

        let dispatcher =
            EventDispatcher::new(Arc::clone(&self.docker), Arc::clone(&self.manager));
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            match dispatcher.run(cancel).await {
                Ok(()) => info!("event dispatcher stopped"),
                Err(e) => {
                    error!(error = %e, "event dispatcher failed");
                    if fatal_tx.send(e).is_err() {
                        warn!("fatal error receiver dropped");
                    }
                }
            }
        });

        self.task = Some(task);
        self.state = GuardState::Running;
        info!("jail guard started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BaniqError> {
        if self.state != GuardState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping jail guard");

        // in-flight event handling completes before the dispatcher observes cancellation
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "event dispatcher task panicked");
        }

        self.state = GuardState::Stopped;
        info!("jail guard stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            GuardState::Running => {
                if self.dispatcher_finished() {
                    return HealthStatus::Unhealthy("event dispatcher exited".to_owned());
                }
                if self.docker.ping().await.is_err() {
                    return HealthStatus::Degraded("docker daemon not reachable".to_owned());
                }
                if self.manager.fail2ban().ping().await.is_err() {
                    return HealthStatus::Degraded("fail2ban not responding".to_owned());
                }
                HealthStatus::Healthy
            }
            GuardState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            GuardState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 감옥 가드 빌더
pub struct JailGuardBuilder<D: DockerClient, F: Fail2banControl> {
    config: JailManagerConfig,
    docker: Option<Arc<D>>,
    fail2ban: Option<Arc<F>>,
    cancel: Option<CancellationToken>,
}

impl<D: DockerClient, F: Fail2banControl> JailGuardBuilder<D, F> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: JailManagerConfig::default(),
            docker: None,
            fail2ban: None,
            cancel: None,
        }
    }

    /// 감옥 관리자 설정을 지정합니다.
    pub fn config(mut self, config: JailManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Docker 클라이언트를 설정합니다.
    pub fn docker_client(mut self, docker: Arc<D>) -> Self {
        self.docker = Some(docker);
        self
    }

    /// fail2ban 제어기를 설정합니다.
    pub fn fail2ban(mut self, fail2ban: Arc<F>) -> Self {
        self.fail2ban = Some(fail2ban);
        self
    }

    /// 외부 취소 토큰을 연결합니다.
    ///
    /// 설정하지 않으면 가드 전용 토큰을 생성합니다.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 가드를 빌드합니다.
    ///
    /// # Returns
    /// - `JailGuard`: 가드 인스턴스
    /// - `oneshot::Receiver<JailManagerError>`: 디스패처의 치명적 에러 수신 채널
    pub fn build(
        self,
    ) -> Result<(JailGuard<D, F>, oneshot::Receiver<JailManagerError>), JailManagerError> {
        self.config.validate()?;

        let docker = self.docker.ok_or_else(|| JailManagerError::Config {
            field: "docker_client".to_owned(),
            reason: "docker client must be provided".to_owned(),
        })?;
        let fail2ban = self.fail2ban.ok_or_else(|| JailManagerError::Config {
            field: "fail2ban".to_owned(),
            reason: "fail2ban control must be provided".to_owned(),
        })?;

        let manager = Arc::new(JailManager::from_config(&self.config, fail2ban));
        let (fatal_tx, fatal_rx) = oneshot::channel();

        let guard = JailGuard {
            state: GuardState::Initialized,
            docker,
            manager,
            cancel: self.cancel.unwrap_or_default(),
            fatal_tx: Some(fatal_tx),
            task: None,
        };

        Ok((guard, fatal_rx))
    }
}

impl<D: DockerClient, F: Fail2banControl> Default for JailGuardBuilder<D, F> {
    fn default() -> Self {
        Self::new()
    }
}
