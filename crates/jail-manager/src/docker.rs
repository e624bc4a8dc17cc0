//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ EventDispatcher  │
//! └────────┬─────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │DockerClient │ (trait)
//!   └─────────────┘
//!        │     │
//!        ▼     ▼
//!   ┌───────┐ ┌────┐
//!   │Bollard│ │Mock│
//!   └───┬───┘ └────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Event Subscription
//!
//! [`DockerClient::events`] returns a `'static` stream. The bollard
//! implementation runs the Docker event request on a pump task that owns a
//! clone of the client and forwards decoded events through a bounded channel.
//! The pump stops when the consumer drops the stream or the Docker stream ends.
//!
//! # Container ID Validation
//!
//! Methods that accept container IDs reject anything that is not 1-64 ASCII
//! hex characters before calling Docker.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use baniq_core::types::ContainerInfo;

use crate::error::JailManagerError;
use crate::event::{ContainerEvent, ContainerEventKind};

/// Docker actions the event subscription is filtered to.
pub const SUBSCRIBED_ACTIONS: [&str; 4] = ["start", "die", "stop", "destroy"];

/// Default capacity of the event pump channel.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Boxed stream of container lifecycle events.
pub type EventStream = BoxStream<'static, Result<ContainerEvent, JailManagerError>>;

/// Validates a container ID to prevent injection attacks.
///
/// Docker container IDs are 64-character hex strings (or shorter prefix forms).
fn validate_container_id(id: &str) -> Result<(), JailManagerError> {
    if id.is_empty() || id.len() > 64 {
        return Err(JailManagerError::DockerApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(JailManagerError::DockerApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting Docker API operations.
///
/// # Implementations
///
/// - [`BollardDockerClient`]: Production implementation using the `bollard` library
/// - `MockDockerClient`: Scripted containers and events (available in tests only)
///
/// # Error Handling
///
/// - **404 errors**: Converted to `JailManagerError::ContainerNotFound`
/// - **Connection errors**: Wrapped as `JailManagerError::DockerConnection`
/// - **Subscription errors**: Yielded as `JailManagerError::EventStream` stream items
pub trait DockerClient: Send + Sync + 'static {
    /// Lists running containers with their labels.
    fn list_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerInfo>, JailManagerError>> + Send;

    /// Inspects a container and returns its current labels.
    ///
    /// # Errors
    ///
    /// - `JailManagerError::ContainerNotFound`: Container does not exist (404)
    /// - `JailManagerError::DockerApi`: Invalid ID or other API errors
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerInfo, JailManagerError>> + Send;

    /// Subscribes to container `start`, `die`, `stop`, and `destroy` events.
    ///
    /// The stream ends or yields an `EventStream` error when the subscription
    /// breaks. Both are terminal for the consumer.
    fn events(&self) -> EventStream;

    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `JailManagerError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), JailManagerError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` so the event pump task can own a handle.
///
/// # Examples
///
/// ```ignore
/// use baniq_jail_manager::BollardDockerClient;
///
/// let client = BollardDockerClient::connect_with_socket("/var/run/docker.sock")?;
/// # Ok::<(), baniq_jail_manager::JailManagerError>(())
/// ```
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
    event_buffer: usize,
}

impl BollardDockerClient {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `JailManagerError::DockerConnection` if the connection fails.
    pub fn connect_local() -> Result<Self, JailManagerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            JailManagerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
            event_buffer: DEFAULT_EVENT_BUFFER,
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `JailManagerError::DockerConnection` if the connection fails.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, JailManagerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    JailManagerError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
            event_buffer: DEFAULT_EVENT_BUFFER,
        })
    }

    /// Sets the capacity of the event pump channel.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

/// Builds the `filters` map for the Docker events request.
fn event_filters() -> HashMap<String, Vec<String>> {
    HashMap::from([
        ("type".to_owned(), vec!["container".to_owned()]),
        (
            "event".to_owned(),
            SUBSCRIBED_ACTIONS.iter().map(|a| (*a).to_owned()).collect(),
        ),
    ])
}

/// Converts a Docker event message into a [`ContainerEvent`].
///
/// Returns `None` when the message carries no actor ID.
fn container_event_from_message(
    message: bollard::models::EventMessage,
) -> Option<ContainerEvent> {
    let actor = message.actor?;
    let id = actor.id.filter(|id| !id.is_empty())?;
    let kind = ContainerEventKind::from_action(message.action.as_deref().unwrap_or_default());

    let event = ContainerEvent::new(id, kind);
    let name = actor
        .attributes
        .and_then(|mut attrs| attrs.remove("name"))
        .filter(|n| !n.is_empty());
    Some(match name {
        Some(name) => event.with_name(name.trim_start_matches('/')),
        None => event,
    })
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

impl DockerClient for BollardDockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, JailManagerError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| JailManagerError::DockerApi(format!("list containers failed: {e}")))?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let names = container.names.unwrap_or_default();
            let name = names
                .first()
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default();

            result.push(ContainerInfo {
                id: container.id.unwrap_or_default(),
                name,
                image: container.image.unwrap_or_default(),
                status: container.state.unwrap_or_default(),
                labels: container.labels.unwrap_or_default(),
            });
        }

        Ok(result)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, JailManagerError> {
        validate_container_id(id)?;

        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if is_not_found(&e) {
                JailManagerError::ContainerNotFound(id.to_owned())
            } else {
                JailManagerError::DockerApi(format!("inspect container failed: {e}"))
            }
        })?;

        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let status = details
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        let (image, labels) = details
            .config
            .map(|c| (c.image.unwrap_or_default(), c.labels.unwrap_or_default()))
            .unwrap_or_default();

        Ok(ContainerInfo {
            id: details.id.unwrap_or_else(|| id.to_owned()),
            name,
            image,
            status,
            labels,
        })
    }

    fn events(&self) -> EventStream {
        use bollard::system::EventsOptions;

        let docker = Arc::clone(&self.docker);
        let (tx, rx) = mpsc::channel(self.event_buffer);

        tokio::spawn(async move {
            let options = EventsOptions::<String> {
                filters: event_filters(),
                ..Default::default()
            };
            let mut upstream = std::pin::pin!(docker.events(Some(options)));

            loop {
                let item = tokio::select! {
                    () = tx.closed() => {
                        debug!("event consumer dropped, stopping docker event pump");
                        return;
                    }
                    item = upstream.next() => item,
                };

                let Some(item) = item else {
                    let _ = tx
                        .send(Err(JailManagerError::EventStream(
                            "docker event stream ended".to_owned(),
                        )))
                        .await;
                    return;
                };

                match item {
                    Ok(message) => {
                        let Some(event) = container_event_from_message(message) else {
                            warn!("ignoring docker event without container id");
                            continue;
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(JailManagerError::EventStream(format!(
                                "docker event subscription failed: {e}"
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    async fn ping(&self) -> Result<(), JailManagerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| JailManagerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock Docker 클라이언트
///
/// 설정된 컨테이너 목록과 이벤트 스크립트를 반환합니다.
/// 스크립트가 끝나면 스트림은 `close_after_script`가 아닌 한 열린 채로 대기합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    /// list/inspect 응답
    pub containers: std::sync::Mutex<Vec<ContainerInfo>>,
    /// events 호출 시 한 번 내보낼 이벤트
    pub script: std::sync::Mutex<Vec<Result<ContainerEvent, JailManagerError>>>,
    /// 스크립트 이후 스트림 종료 여부
    pub close_after_script: bool,
    /// list_containers 실패 시뮬레이션
    pub fail_list: bool,
    /// ping 실패 시뮬레이션
    pub fail_ping: bool,
    /// 다음 list_containers 응답 직후 멈출 컨테이너 ID
    pub stop_after_list: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockDockerClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테스트용 컨테이너를 설정합니다.
    pub fn with_containers(self, containers: Vec<ContainerInfo>) -> Self {
        *self.containers.lock().unwrap() = containers;
        self
    }

    /// 이벤트 스크립트를 설정합니다.
    pub fn with_events(self, events: Vec<ContainerEvent>) -> Self {
        *self.script.lock().unwrap() = events.into_iter().map(Ok).collect();
        self
    }

    /// 스크립트 끝에서 스트림을 닫습니다.
    pub fn closing_stream(mut self) -> Self {
        self.close_after_script = true;
        self
    }

    /// list_containers가 실패하도록 설정합니다.
    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// ping이 실패하도록 설정합니다.
    pub fn with_failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// 다음 목록 조회 직후 주어진 컨테이너를 멈춥니다.
    pub fn stopping_after_list(self, ids: &[&str]) -> Self {
        *self.stop_after_list.lock().unwrap() = ids.iter().map(|id| (*id).to_owned()).collect();
        self
    }

    /// 실행 중 컨테이너 목록에서 제거합니다.
    pub fn remove_container(&self, id: &str) {
        self.containers.lock().unwrap().retain(|c| c.id != id);
    }

    /// 실행 중 컨테이너를 교체하거나 추가합니다.
    pub fn upsert_container(&self, container: ContainerInfo) {
        let mut containers = self.containers.lock().unwrap();
        containers.retain(|c| c.id != container.id);
        containers.push(container);
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, JailManagerError> {
        if self.fail_list {
            return Err(JailManagerError::DockerApi("mock list failure".to_owned()));
        }
        let listed = self.containers.lock().unwrap().clone();
        for id in std::mem::take(&mut *self.stop_after_list.lock().unwrap()) {
            self.remove_container(&id);
        }
        Ok(listed)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, JailManagerError> {
        validate_container_id(id)?;
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| JailManagerError::ContainerNotFound(id.to_owned()))
    }

    fn events(&self) -> EventStream {
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        let scripted = stream::iter(script);
        if self.close_after_script {
            scripted.boxed()
        } else {
            scripted.chain(stream::pending()).boxed()
        }
    }

    async fn ping(&self) -> Result<(), JailManagerError> {
        if self.fail_ping {
            return Err(JailManagerError::DockerConnection(
                "mock ping failure".to_owned(),
            ));
        }
        Ok(())
    }
}
