//! 커스텀 필터 생성기
//!
//! 감옥이 인라인 매칭 패턴(`failregex`)을 제공하면 fail2ban 필터 파일을
//! `<filter_dir>/<name>.conf`로 기록합니다. 같은 이름의 파일은 덮어씁니다.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use baniq_core::types::short_id;

use crate::error::JailManagerError;
use crate::jail::{CONF_EXTENSION, JailConfig};
use crate::labels::is_valid_name;

/// 커스텀 필터 파일 생성기
#[derive(Debug, Clone)]
pub struct FilterGenerator {
    filter_dir: PathBuf,
}

impl FilterGenerator {
    /// 필터 디렉토리를 지정해 생성합니다.
    pub fn new(filter_dir: impl Into<PathBuf>) -> Self {
        Self {
            filter_dir: filter_dir.into(),
        }
    }

    /// 필터 디렉토리 경로
    pub fn filter_dir(&self) -> &Path {
        &self.filter_dir
    }

    /// 필터 이름에 해당하는 파일 경로
    pub fn filter_path(&self, name: &str) -> PathBuf {
        self.filter_dir.join(format!("{name}.{CONF_EXTENSION}"))
    }

    /// 필터 파일을 기록하고 이름을 반환합니다.
    ///
    /// `name` 또는 `fail_regex`가 비어 있으면 아무 것도 쓰지 않고 `None`을 반환합니다.
    /// 호출자는 이 경우 기존 필터 참조를 그대로 사용해야 합니다.
    pub async fn generate(
        &self,
        name: &str,
        fail_regex: &str,
        ignore_regex: &str,
    ) -> Result<Option<String>, JailManagerError> {
        if name.is_empty() || fail_regex.is_empty() {
            debug!(filter = name, "no custom filter produced");
            return Ok(None);
        }

        let path = self.filter_path(name);
        let content = render_filter(fail_regex, ignore_regex);

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| JailManagerError::FilterWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        metrics::counter!(baniq_core::metrics::FILTERS_WRITTEN_TOTAL).increment(1);
        info!(
            filter = name,
            path = %path.display(),
            "custom filter written"
        );

        Ok(Some(name.to_owned()))
    }
}

/// fail2ban `[Definition]` 섹션 형식의 필터 내용을 만듭니다.
pub fn render_filter(fail_regex: &str, ignore_regex: &str) -> String {
    let mut content = format!("[Definition]\nfailregex = {fail_regex}\n");
    if !ignore_regex.is_empty() {
        content.push_str(&format!("ignoreregex = {ignore_regex}\n"));
    }
    content
}

/// 인라인 패턴을 가진 감옥의 필터 이름을 결정합니다.
///
/// 우선순위: `filtername` 라벨 → `filter` 라벨 → `<shortId>_<jailName>`.
/// 선택된 이름이 파일 이름으로 쓸 수 없으면 `<shortId>_<jailName>`을 사용합니다.
pub fn resolve_filter_name(container_id: &str, jail: &JailConfig) -> String {
    let fallback = || format!("{}_{}", short_id(container_id), jail.name);
    let candidate = if !jail.custom_filter_name.is_empty() {
        &jail.custom_filter_name
    } else if !jail.filter.is_empty() {
        &jail.filter
    } else {
        return fallback();
    };

    if is_valid_name(candidate) {
        candidate.clone()
    } else {
        warn!(
            jail = jail.name.as_str(),
            filter = candidate.as_str(),
            "filter name is not usable as a file name, using per-container name"
        );
        fallback()
    }
}
