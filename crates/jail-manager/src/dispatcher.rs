//! 이벤트 디스패처 -- 컨테이너 수명주기 이벤트를 감옥 관리자로 라우팅
//!
//! # 처리 흐름
//! ```text
//! Docker events ──> EventDispatcher ──start──> inspect ──> labels ──> add_jail (filter + jail)
//!                                   └─stop/die/destroy──> remove_jails_for_container
//! ```
//!
//! 이벤트 구독을 먼저 요청한 뒤 이미 실행 중인 컨테이너를 조정(reconcile)합니다.
//! 구독은 백그라운드에서 열리므로, 조정이 끝나면 목록을 다시 조회해
//! 그사이 멈춘 컨테이너의 감옥을 제거합니다.
//! 개별 이벤트 처리 실패는 로그만 남기고, 이벤트 구독 실패만 치명적입니다.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use baniq_core::types::ContainerInfo;

use crate::docker::DockerClient;
use crate::error::JailManagerError;
use crate::event::{ContainerEvent, ContainerEventKind};
use crate::fail2ban::Fail2banControl;
use crate::labels::{extract_jail_configs, is_enabled};
use crate::manager::JailManager;

/// 이벤트 디스패처
pub struct EventDispatcher<D: DockerClient, F: Fail2banControl> {
    docker: Arc<D>,
    manager: Arc<JailManager<F>>,
}

impl<D: DockerClient, F: Fail2banControl> EventDispatcher<D, F> {
    /// Docker 클라이언트와 감옥 관리자로 생성합니다.
    pub fn new(docker: Arc<D>, manager: Arc<JailManager<F>>) -> Self {
        Self { docker, manager }
    }

    /// 감옥 관리자
    pub fn manager(&self) -> &Arc<JailManager<F>> {
        &self.manager
    }

    /// 취소될 때까지 이벤트를 처리합니다.
    ///
    /// # Errors
    ///
    /// - 실행 중 컨테이너 목록 조회 실패
    /// - 이벤트 스트림 에러 또는 종료 (`EventStream`)
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), JailManagerError> {
        let mut events = self.docker.events();
        info!("subscribed to docker container events");

        self.reconcile(&cancel).await?;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("event dispatcher cancelled");
                    return Ok(());
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if let Err(e) = self.handle_event(&event).await {
                        metrics::counter!(baniq_core::metrics::EVENT_ERRORS_TOTAL).increment(1);
                        error!(
                            container_id = event.container_id.as_str(),
                            action = event.kind.as_str(),
                            error = %e,
                            "failed to handle container event"
                        );
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "docker event subscription failed");
                    return Err(e);
                }
                None => {
                    error!("docker event stream closed");
                    return Err(JailManagerError::EventStream(
                        "docker event stream closed".to_owned(),
                    ));
                }
            }
        }
    }

    /// 이미 실행 중인 컨테이너에 대해 `start` 처리를 수행합니다.
    ///
    /// 컨테이너별 실패는 로그만 남기고 계속 진행합니다.
    /// 처리가 끝나면 목록을 다시 조회해 그사이 멈춘 컨테이너의 감옥을 제거합니다.
    /// 처리에 성공한 컨테이너 수를 반환합니다.
    ///
    /// # Errors
    ///
    /// 컨테이너 목록 조회에 실패하면 에러를 반환합니다.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<usize, JailManagerError> {
        let containers = self.docker.list_containers().await?;
        info!(
            containers = containers.len(),
            "reconciling already running containers"
        );

        let mut processed = 0;
        for container in &containers {
            if cancel.is_cancelled() {
                debug!("reconciliation interrupted by cancellation");
                break;
            }
            match self.apply_container(container).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!(
                        container_id = container.id.as_str(),
                        container = container.name.as_str(),
                        error = %e,
                        "failed to process existing container"
                    );
                }
            }
        }

        if !cancel.is_cancelled() {
            self.prune_stopped().await;
        }

        Ok(processed)
    }

    /// 더 이상 실행 중이 아닌 컨테이너가 소유한 감옥을 제거합니다.
    ///
    /// 구독이 실제로 열리기 전에 멈춘 컨테이너는 teardown 이벤트가 오지 않으므로
    /// 여기서 정리합니다. 실패는 로그만 남깁니다. 제거한 컨테이너 수를 반환합니다.
    pub async fn prune_stopped(&self) -> usize {
        let running: HashSet<String> = match self.docker.list_containers().await {
            Ok(containers) => containers.into_iter().map(|c| c.id).collect(),
            Err(e) => {
                warn!(error = %e, "failed to re-list containers, skipping prune");
                return 0;
            }
        };

        let mut pruned = 0;
        for container_id in self.manager.tracked_containers().await {
            if running.contains(&container_id) {
                continue;
            }
            info!(
                container_id = container_id.as_str(),
                "container stopped during reconciliation, removing jails"
            );
            match self.manager.remove_jails_for_container(&container_id).await {
                Ok(()) => pruned += 1,
                Err(e) => {
                    warn!(
                        container_id = container_id.as_str(),
                        error = %e,
                        "failed to remove jails of stopped container"
                    );
                }
            }
        }
        pruned
    }

    /// 이벤트 하나를 처리합니다.
    pub async fn handle_event(&self, event: &ContainerEvent) -> Result<(), JailManagerError> {
        metrics::counter!(
            baniq_core::metrics::EVENTS_PROCESSED_TOTAL,
            baniq_core::metrics::LABEL_ACTION => event.kind.as_str()
        )
        .increment(1);
        debug!(event = %event, "container event received");

        match &event.kind {
            ContainerEventKind::Start => {
                self.handle_start(&event.container_id).await?;
                Ok(())
            }
            kind if kind.is_teardown() => {
                self.manager
                    .remove_jails_for_container(&event.container_id)
                    .await
            }
            _ => Ok(()),
        }
    }

    /// 컨테이너를 조회해 감옥을 생성합니다. 생성한 감옥 수를 반환합니다.
    pub async fn handle_start(&self, container_id: &str) -> Result<usize, JailManagerError> {
        let container = self.docker.inspect_container(container_id).await?;
        self.apply_container(&container).await
    }

    async fn apply_container(&self, container: &ContainerInfo) -> Result<usize, JailManagerError> {
        if !is_enabled(&container.labels) {
            debug!(
                container_id = container.id.as_str(),
                container = container.name.as_str(),
                "container not enabled for baniq, skipping"
            );
            return Ok(0);
        }

        let jails = extract_jail_configs(&container.labels, &container.name);
        if jails.is_empty() {
            info!(
                container_id = container.id.as_str(),
                container = container.name.as_str(),
                "no complete jail configuration in labels"
            );
            return Ok(0);
        }

        let mut added = 0;
        for jail in jails {
            let jail_name = jail.name.clone();
            self.manager.add_jail(&container.id, jail).await?;
            added += 1;
            info!(
                container_id = container.id.as_str(),
                container = container.name.as_str(),
                jail = jail_name.as_str(),
                "jail applied"
            );
        }

        Ok(added)
    }
}
