//! 통합 테스트 -- 전체 감옥 수명주기 플로우 검증
//!
//! 컨테이너 이벤트 수신 → 라벨 추출 → 필터/감옥 파일 생성 → 리로드 → 삭제
//! 시나리오를 실제 파일 시스템(임시 디렉토리)과 채널을 사용하여 테스트합니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use baniq_core::pipeline::Pipeline;
use baniq_core::types::ContainerInfo;
use baniq_jail_manager::{
    ContainerEvent, ContainerEventKind, EventDispatcher, JailConfig, JailGuardBuilder,
    JailManager, JailManagerConfigBuilder, JailManagerError,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// Mock collaborators for integration tests
mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use baniq_jail_manager::{DockerClient, EventStream, Fail2banControl};
    use futures::StreamExt;

    pub struct TestDockerClient {
        containers: Mutex<Vec<ContainerInfo>>,
        events: Mutex<Option<mpsc::Receiver<Result<ContainerEvent, JailManagerError>>>>,
    }

    impl TestDockerClient {
        /// Returns the client and the sender that feeds its event stream.
        pub fn with_event_channel() -> (
            Self,
            mpsc::Sender<Result<ContainerEvent, JailManagerError>>,
        ) {
            let (tx, rx) = mpsc::channel(16);
            let client = Self {
                containers: Mutex::new(Vec::new()),
                events: Mutex::new(Some(rx)),
            };
            (client, tx)
        }

        pub fn add_container(&self, container: ContainerInfo) {
            self.containers.lock().unwrap().push(container);
        }

        pub fn remove_container(&self, id: &str) {
            self.containers.lock().unwrap().retain(|c| c.id != id);
        }
    }

    impl DockerClient for TestDockerClient {
        async fn list_containers(&self) -> Result<Vec<ContainerInfo>, JailManagerError> {
            Ok(self.containers.lock().unwrap().clone())
        }

        async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, JailManagerError> {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| JailManagerError::ContainerNotFound(id.to_owned()))
        }

        fn events(&self) -> EventStream {
            match self.events.lock().unwrap().take() {
                Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed(),
                None => futures::stream::empty().boxed(),
            }
        }

        async fn ping(&self) -> Result<(), JailManagerError> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct CountingFail2ban {
        reloads: AtomicUsize,
    }

    impl CountingFail2ban {
        pub fn reloads(&self) -> usize {
            self.reloads.load(Ordering::SeqCst)
        }
    }

    impl Fail2banControl for CountingFail2ban {
        async fn ping(&self) -> Result<(), JailManagerError> {
            Ok(())
        }

        async fn reload(&self) -> Result<(), JailManagerError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

use mock::{CountingFail2ban, TestDockerClient};

const NGINX_ID: &str = "4f2a9c1b7d3e8a6f0b5c2d1e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a";
const SSH_ID: &str = "9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f1e0d9c8b7a6f5e4d3c2b1a0f9e8d";

struct Env {
    jails: TempDir,
    filters: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            jails: TempDir::new().unwrap(),
            filters: TempDir::new().unwrap(),
        }
    }

    fn jail_files(&self) -> Vec<String> {
        list_dir(self.jails.path())
    }

    fn filter_files(&self) -> Vec<String> {
        list_dir(self.filters.path())
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn container(id: &str, name: &str, labels: &[(&str, &str)]) -> ContainerInfo {
    ContainerInfo {
        id: id.to_owned(),
        name: format!("/{name}"),
        image: format!("{name}:latest"),
        status: "running".to_owned(),
        labels: labels
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>(),
    }
}

fn start(id: &str) -> Result<ContainerEvent, JailManagerError> {
    Ok(ContainerEvent::new(id, ContainerEventKind::Start))
}

fn event(id: &str, action: &str) -> Result<ContainerEvent, JailManagerError> {
    Ok(ContainerEvent::new(id, ContainerEventKind::from_action(action)))
}

async fn wait_for_reloads(fail2ban: &CountingFail2ban, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while fail2ban.reloads() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for reloads");
}

fn dispatcher(
    env: &Env,
    docker: TestDockerClient,
) -> (
    Arc<EventDispatcher<TestDockerClient, CountingFail2ban>>,
    Arc<CountingFail2ban>,
) {
    let fail2ban = Arc::new(CountingFail2ban::default());
    let manager = Arc::new(JailManager::new(
        env.jails.path(),
        env.filters.path(),
        Arc::clone(&fail2ban),
    ));
    (
        Arc::new(EventDispatcher::new(Arc::new(docker), manager)),
        fail2ban,
    )
}

#[tokio::test]
async fn test_logpath_and_filter_labels_produce_jail_with_defaults() {
    let env = Env::new();
    let (docker, events) = TestDockerClient::with_event_channel();
    docker.add_container(container(
        NGINX_ID,
        "nginx",
        &[
            ("baniq.enabled", "true"),
            ("baniq.web.logpath", "/var/log/nginx/access.log"),
            ("baniq.web.filter", "nginx-404"),
        ],
    ));
    let (dispatcher, fail2ban) = dispatcher(&env, docker);

    let cancel = CancellationToken::new();
    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };
    // reconcile already applied the running container
    wait_for_reloads(&fail2ban, 1).await;

    events.send(start(NGINX_ID)).await.unwrap();
    wait_for_reloads(&fail2ban, 2).await;

    assert_eq!(env.jail_files(), vec!["4f2a9c1b7d3e-web.conf"]);
    let content =
        std::fs::read_to_string(env.jails.path().join("4f2a9c1b7d3e-web.conf")).unwrap();
    assert_eq!(
        content,
        "[web]\n\
         enabled = true\n\
         filter = nginx-404\n\
         logpath = /var/log/nginx/access.log\n\
         findtime = 10m\n\
         maxretry = 5\n\
         bantime = 1h\n\
         port = 0:65535\n\
         protocol = tcp\n"
    );
    assert_eq!(
        dispatcher.manager().tracked_containers().await,
        vec![NGINX_ID.to_owned()]
    );

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_inline_failregex_generates_filter_named_after_container() {
    let env = Env::new();
    let (docker, events) = TestDockerClient::with_event_channel();
    docker.add_container(container(
        SSH_ID,
        "sshd",
        &[
            ("baniq.enabled", "true"),
            ("baniq.ssh.failregex", "^Failed login from <HOST>$"),
        ],
    ));
    let (dispatcher, fail2ban) = dispatcher(&env, docker);

    let cancel = CancellationToken::new();
    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };
    wait_for_reloads(&fail2ban, 1).await;
    drop(events);

    let filters = env.filter_files();
    assert_eq!(filters.len(), 1);
    assert!(filters[0].contains("9e8d7c6b5a4f"));
    assert!(filters[0].contains("ssh"));

    let jail = std::fs::read_to_string(env.jails.path().join("9e8d7c6b5a4f-ssh.conf")).unwrap();
    let parsed = JailConfig::parse_rendered(&jail).unwrap();
    assert_eq!(parsed.filter, "9e8d7c6b5a4f_ssh");
    assert_eq!(format!("{}.conf", parsed.filter), filters[0]);

    // the closed event stream ends the dispatcher
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, JailManagerError::EventStream(_)));
    cancel.cancel();
}

#[tokio::test]
async fn test_disabled_container_creates_nothing() {
    let env = Env::new();
    let (docker, _events) = TestDockerClient::with_event_channel();
    docker.add_container(container(
        NGINX_ID,
        "nginx",
        &[("baniq.enabled", "false"), ("baniq.web.logpath", "/x")],
    ));
    let (dispatcher, fail2ban) = dispatcher(&env, docker);

    dispatcher
        .handle_event(&ContainerEvent::new(NGINX_ID, ContainerEventKind::Start))
        .await
        .unwrap();

    assert!(env.jail_files().is_empty());
    assert!(env.filter_files().is_empty());
    assert_eq!(fail2ban.reloads(), 0);
}

#[tokio::test]
async fn test_labels_without_detection_source_create_nothing() {
    let env = Env::new();
    let (docker, _events) = TestDockerClient::with_event_channel();
    docker.add_container(container(
        NGINX_ID,
        "nginx",
        &[
            ("baniq.enabled", "true"),
            ("baniq.web.maxretry", "3"),
            ("baniq.web.bantime", "1d"),
            ("baniq.web.ignoreregex", "^127\\.0\\.0\\.1$"),
        ],
    ));
    let (dispatcher, fail2ban) = dispatcher(&env, docker);

    let added = dispatcher.handle_start(NGINX_ID).await.unwrap();
    assert_eq!(added, 0);
    assert!(env.jail_files().is_empty());
    assert_eq!(fail2ban.reloads(), 0);
}

#[tokio::test]
async fn test_add_then_remove_reloads_twice_and_clears_ownership() {
    let env = Env::new();
    let fail2ban = Arc::new(CountingFail2ban::default());
    let manager = JailManager::new(env.jails.path(), env.filters.path(), Arc::clone(&fail2ban));

    let jail = JailConfig {
        log_path: "/var/log/nginx/access.log".to_owned(),
        filter: "nginx-404".to_owned(),
        ..JailConfig::new("web", "nginx")
    };
    manager.add_jail(NGINX_ID, jail).await.unwrap();
    manager.remove_jails_for_container(NGINX_ID).await.unwrap();

    assert!(!env.jails.path().join("4f2a9c1b7d3e-web.conf").exists());
    assert!(manager.jail_files_for(NGINX_ID).await.is_empty());
    assert!(manager.tracked_containers().await.is_empty());
    assert_eq!(fail2ban.reloads(), 2);

    // idempotent second removal
    manager.remove_jails_for_container(NGINX_ID).await.unwrap();
    assert_eq!(fail2ban.reloads(), 2);
}

#[tokio::test]
async fn test_full_lifecycle_through_guard() {
    let env = Env::new();
    let (docker, events) = TestDockerClient::with_event_channel();
    let docker = Arc::new(docker);
    let fail2ban = Arc::new(CountingFail2ban::default());

    let config = JailManagerConfigBuilder::new()
        .jail_dir(env.jails.path())
        .filter_dir(env.filters.path())
        .build()
        .unwrap();
    let (mut guard, _fatal_rx) = JailGuardBuilder::new()
        .config(config)
        .docker_client(Arc::clone(&docker))
        .fail2ban(Arc::clone(&fail2ban))
        .build()
        .unwrap();

    guard.start().await.unwrap();
    assert!(guard.health_check().await.is_healthy());

    // a multi-jail container starts after the daemon
    docker.add_container(container(
        NGINX_ID,
        "nginx",
        &[
            ("baniq.enabled", "true"),
            ("baniq.web.logpath", "/var/log/nginx/access.log"),
            ("baniq.web.filter", "nginx-404"),
            ("baniq.api.failregex", "^Unauthorized <HOST>$"),
            ("baniq.api.filtername", "api-auth"),
            ("baniq.api.port", "8080"),
        ],
    ));
    events.send(start(NGINX_ID)).await.unwrap();
    wait_for_reloads(&fail2ban, 2).await;

    assert_eq!(
        env.jail_files(),
        vec!["4f2a9c1b7d3e-api.conf", "4f2a9c1b7d3e-web.conf"]
    );
    assert_eq!(env.filter_files(), vec!["api-auth.conf"]);

    // unrelated events do not touch anything
    events.send(event(NGINX_ID, "pause")).await.unwrap();

    // die followed by destroy: second removal is a no-op
    events.send(event(NGINX_ID, "die")).await.unwrap();
    events.send(event(NGINX_ID, "destroy")).await.unwrap();
    wait_for_reloads(&fail2ban, 3).await;
    docker.remove_container(NGINX_ID);

    tokio::time::timeout(Duration::from_secs(5), async {
        while guard.tracked_container_count().await != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(env.jail_files().is_empty());
    // filters are shared by name and survive container removal
    assert_eq!(env.filter_files(), vec!["api-auth.conf"]);

    guard.stop().await.unwrap();
    assert_eq!(fail2ban.reloads(), 3);
}

#[tokio::test]
async fn test_two_containers_with_same_jail_name_do_not_collide() {
    let env = Env::new();
    let (docker, _events) = TestDockerClient::with_event_channel();
    let labels = [
        ("baniq.enabled", "true"),
        ("baniq.ssh.failregex", "^Failed login from <HOST>$"),
    ];
    docker.add_container(container(NGINX_ID, "a", &labels));
    docker.add_container(container(SSH_ID, "b", &labels));
    let (dispatcher, _fail2ban) = dispatcher(&env, docker);

    let processed = dispatcher
        .reconcile(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(processed, 2);

    assert_eq!(
        env.jail_files(),
        vec!["4f2a9c1b7d3e-ssh.conf", "9e8d7c6b5a4f-ssh.conf"]
    );
    assert_eq!(
        env.filter_files(),
        vec!["4f2a9c1b7d3e_ssh.conf", "9e8d7c6b5a4f_ssh.conf"]
    );

    dispatcher
        .handle_event(&ContainerEvent::new(NGINX_ID, ContainerEventKind::Stop))
        .await
        .unwrap();
    assert_eq!(env.jail_files(), vec!["9e8d7c6b5a4f-ssh.conf"]);
}

#[tokio::test]
async fn test_subscription_error_is_fatal_for_guard() {
    let env = Env::new();
    let (docker, events) = TestDockerClient::with_event_channel();
    let config = JailManagerConfigBuilder::new()
        .jail_dir(env.jails.path())
        .filter_dir(env.filters.path())
        .build()
        .unwrap();
    let (mut guard, fatal_rx) = JailGuardBuilder::new()
        .config(config)
        .docker_client(Arc::new(docker))
        .fail2ban(Arc::new(CountingFail2ban::default()))
        .build()
        .unwrap();

    guard.start().await.unwrap();
    events
        .send(Err(JailManagerError::EventStream("connection reset".to_owned())))
        .await
        .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), fatal_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(err.to_string().contains("connection reset"));
    guard.stop().await.unwrap();
}
