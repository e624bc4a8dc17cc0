//! 감옥 수명주기 관리자
//!
//! [`JailManager`]는 컨테이너 ID → 감옥 파일 이름 목록(소유 테이블)을 관리합니다.
//! 소유 테이블 변경, 감옥/필터 파일 입출력, fail2ban 리로드는 모두
//! 하나의 뮤텍스 안에서 수행되므로 서로 다른 컨테이너의 작업도 직렬화됩니다.
//!
//! # 일관성
//!
//! 파일 쓰기/삭제가 성공한 뒤 리로드가 실패해도 소유 테이블과 디스크 상태는
//! 되돌리지 않습니다. 에러는 호출자에게 전달되고, 같은 작업을 다시 호출해
//! 재시도할 수 있습니다.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::JailManagerConfig;
use crate::error::JailManagerError;
use crate::fail2ban::Fail2banControl;
use crate::filter::{FilterGenerator, resolve_filter_name};
use crate::jail::{JailConfig, jail_file_name};

/// 감옥 수명주기 관리자
pub struct JailManager<F: Fail2banControl> {
    jail_dir: PathBuf,
    filters: FilterGenerator,
    fail2ban: Arc<F>,
    /// 컨테이너 ID → 소유 감옥 파일 이름
    owned: Mutex<HashMap<String, Vec<String>>>,
}

impl<F: Fail2banControl> JailManager<F> {
    /// 감옥/필터 디렉토리와 fail2ban 제어기로 생성합니다.
    pub fn new(
        jail_dir: impl Into<PathBuf>,
        filter_dir: impl Into<PathBuf>,
        fail2ban: Arc<F>,
    ) -> Self {
        Self {
            jail_dir: jail_dir.into(),
            filters: FilterGenerator::new(filter_dir),
            fail2ban,
            owned: Mutex::new(HashMap::new()),
        }
    }

    /// 감옥 관리자 설정에서 생성합니다.
    pub fn from_config(config: &JailManagerConfig, fail2ban: Arc<F>) -> Self {
        Self::new(&config.jail_dir, &config.filter_dir, fail2ban)
    }

    /// 감옥 파일 디렉토리
    pub fn jail_dir(&self) -> &Path {
        &self.jail_dir
    }

    /// fail2ban 제어기
    pub fn fail2ban(&self) -> &Arc<F> {
        &self.fail2ban
    }

    /// 감옥 파일 하나를 기록하고 소유 테이블에 추가한 뒤 리로드합니다.
    ///
    /// 비어 있는 튜닝 필드에는 기본값이 적용됩니다.
    /// 인라인 패턴(`failregex`)이 있으면 같은 잠금 안에서 필터 파일을 먼저 기록하고
    /// 감옥의 `filter`를 생성된 필터 이름으로 바꿉니다.
    ///
    /// # Errors
    ///
    /// - `FilterWrite`: 필터 쓰기 실패. 감옥 파일과 소유 테이블은 변경되지 않습니다.
    /// - `JailWrite`: 파일 쓰기 실패. 소유 테이블은 변경되지 않습니다.
    /// - `Reload` / `ReloadTimeout`: 리로드 실패. 파일과 소유 테이블은 이미 반영된 상태입니다.
    pub async fn add_jail(
        &self,
        container_id: &str,
        config: JailConfig,
    ) -> Result<(), JailManagerError> {
        let mut config = config.with_defaults();
        let file_name = jail_file_name(container_id, &config.name);
        let path = self.jail_dir.join(&file_name);

        let mut owned = self.owned.lock().await;

        if config.has_inline_filter() {
            let name = resolve_filter_name(container_id, &config);
            if let Some(filter) = self
                .filters
                .generate(&name, &config.fail_regex, &config.ignore_regex)
                .await?
            {
                config.filter = filter;
            }
        }

        tokio::fs::write(&path, config.render())
            .await
            .map_err(|e| JailManagerError::JailWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let files = owned.entry(container_id.to_owned()).or_default();
        if !files.contains(&file_name) {
            files.push(file_name);
        }
        record_tracked(owned.len());
        metrics::counter!(baniq_core::metrics::JAILS_ADDED_TOTAL).increment(1);

        info!(
            container_id = container_id,
            container = config.container_name.as_str(),
            jail = config.name.as_str(),
            path = %path.display(),
            "jail file written"
        );

        self.fail2ban.reload().await
    }

    /// 컨테이너가 소유한 모든 감옥 파일을 삭제하고 리로드합니다.
    ///
    /// 소유 항목이 없으면 아무 것도 하지 않고 성공합니다.
    /// 이미 없는 파일은 건너뜁니다.
    ///
    /// # Errors
    ///
    /// - `JailRemove`: 삭제 실패. 남은 파일 삭제를 중단하고 소유 항목을 유지합니다.
    /// - `Reload` / `ReloadTimeout`: 리로드 실패. 소유 항목은 이미 제거된 상태입니다.
    pub async fn remove_jails_for_container(
        &self,
        container_id: &str,
    ) -> Result<(), JailManagerError> {
        let mut owned = self.owned.lock().await;

        let Some(files) = owned.get(container_id) else {
            debug!(container_id = container_id, "no jails tracked for container");
            return Ok(());
        };

        for file_name in files {
            let path = self.jail_dir.join(file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    metrics::counter!(baniq_core::metrics::JAILS_REMOVED_TOTAL).increment(1);
                    info!(
                        container_id = container_id,
                        path = %path.display(),
                        "jail file removed"
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(
                        container_id = container_id,
                        path = %path.display(),
                        "jail file already removed"
                    );
                }
                Err(e) => {
                    return Err(JailManagerError::JailRemove {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        owned.remove(container_id);
        record_tracked(owned.len());

        self.fail2ban.reload().await
    }

    /// 인라인 필터 파일만 생성합니다. 리로드하지 않습니다.
    ///
    /// 감옥 파일 쓰기와 같은 잠금을 사용합니다.
    /// `name` 또는 `fail_regex`가 비어 있으면 `None`을 반환합니다.
    pub async fn generate_custom_filter(
        &self,
        name: &str,
        fail_regex: &str,
        ignore_regex: &str,
    ) -> Result<Option<String>, JailManagerError> {
        let _owned = self.owned.lock().await;
        self.filters.generate(name, fail_regex, ignore_regex).await
    }

    /// 감옥을 소유한 컨테이너 ID 목록 (정렬됨)
    pub async fn tracked_containers(&self) -> Vec<String> {
        let owned = self.owned.lock().await;
        let mut ids: Vec<String> = owned.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 컨테이너가 소유한 감옥 파일 이름 목록
    pub async fn jail_files_for(&self, container_id: &str) -> Vec<String> {
        self.owned
            .lock()
            .await
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn record_tracked(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(baniq_core::metrics::TRACKED_CONTAINERS).set(count as f64);
}
