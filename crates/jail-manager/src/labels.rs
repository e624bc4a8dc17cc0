//! 컨테이너 라벨 → 감옥 설정 추출
//!
//! `baniq.<jailName>.<property>` 형태의 라벨을 감옥 이름별로 묶어
//! [`JailConfig`] 목록을 만듭니다.
//!
//! # 규칙
//! - `baniq.` 접두어가 없는 라벨은 무시합니다.
//! - 접두어 뒤를 첫 `.`에서 나눠 감옥 이름과 속성으로 해석합니다.
//!   `.`이 없으면 (예: `baniq.enabled`) 감옥 라벨이 아닙니다.
//! - 알 수 없는 속성은 조용히 무시합니다.
//! - 탐지 소스가 하나도 없는 감옥은 버립니다.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::jail::JailConfig;

/// BanIQ 라벨 접두어
pub const LABEL_PREFIX: &str = "baniq.";

/// 컨테이너 단위 활성화 라벨
pub const LABEL_ENABLED: &str = "baniq.enabled";

/// 활성화 라벨에서 유일하게 허용되는 값
const ENABLED_VALUE: &str = "true";

/// 감옥 이름으로 쓸 수 없는 예약어
const RESERVED_JAIL_NAME: &str = "enabled";

/// 이름 최대 길이
const MAX_NAME_LEN: usize = 64;

/// 라벨이 BanIQ 처리를 켰는지 확인합니다.
///
/// 값이 정확히 `"true"`일 때만 활성화로 봅니다.
pub fn is_enabled(labels: &HashMap<String, String>) -> bool {
    labels
        .get(LABEL_ENABLED)
        .is_some_and(|v| v == ENABLED_VALUE)
}

/// 파일 이름과 INI 섹션 헤더에 그대로 들어가도 안전한 이름인지 확인합니다.
///
/// 감옥 이름(`<id12>-<name>.conf`, `[name]`)과 생성할 필터 파일 이름에만 적용합니다.
/// 비어 있거나 `.`/`..`이거나, 경로 구분자, `[`, `]`, 공백, 제어 문자를
/// 포함하면 거부합니다. 유니코드와 `:`는 허용합니다.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '[' | ']') || c.is_whitespace() || c.is_control())
}

/// 라벨 맵에서 완전한 감옥 설정 목록을 추출합니다.
///
/// `container_name`의 선행 `/`는 제거됩니다.
/// 결과는 감옥 이름 순으로 정렬되지만 호출자는 순서에 의존하면 안 됩니다.
pub fn extract_jail_configs(
    labels: &HashMap<String, String>,
    container_name: &str,
) -> Vec<JailConfig> {
    let container_name = container_name.trim_start_matches('/');
    let mut jails: BTreeMap<&str, JailConfig> = BTreeMap::new();

    for (key, value) in labels {
        let Some((jail_name, property)) = split_label(key) else {
            continue;
        };

        if !is_valid_name(jail_name) {
            warn!(
                label = key.as_str(),
                container = container_name,
                "ignoring label with invalid jail name"
            );
            continue;
        }

        if value.contains(['\n', '\r']) {
            warn!(
                label = key.as_str(),
                container = container_name,
                "ignoring multi-line label value"
            );
            continue;
        }

        let jail = jails
            .entry(jail_name)
            .or_insert_with(|| JailConfig::new(jail_name, container_name));
        apply_property(jail, property, value);
    }

    jails
        .into_values()
        .filter(|jail| {
            if jail.is_complete() {
                true
            } else {
                debug!(
                    jail = jail.name.as_str(),
                    container = container_name,
                    "skipping incomplete jail configuration"
                );
                false
            }
        })
        .collect()
}

/// `baniq.<jail>.<property>` 라벨을 (jail, property)로 나눕니다.
fn split_label(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(LABEL_PREFIX)?;
    let (jail_name, property) = rest.split_once('.')?;
    if jail_name == RESERVED_JAIL_NAME {
        return None;
    }
    Some((jail_name, property))
}

fn apply_property(jail: &mut JailConfig, property: &str, value: &str) {
    let value = value.to_owned();
    match property {
        "logpath" => jail.log_path = value,
        "filter" => jail.filter = value,
        "filtername" => jail.custom_filter_name = value,
        "failregex" => jail.fail_regex = value,
        "ignoreregex" => jail.ignore_regex = value,
        "findtime" => jail.find_time = value,
        "maxretry" => jail.max_retry = value,
        "bantime" => jail.ban_time = value,
        "port" => jail.port = value,
        "protocol" => jail.protocol = value,
        _ => {
            debug!(
                jail = jail.name.as_str(),
                property = property,
                "ignoring unknown jail property"
            );
        }
    }
}
