//! 감옥 설정 모델
//!
//! [`JailConfig`]는 컨테이너 하나에서 파생된 fail2ban 감옥 하나의
//! 희망 설정을 나타냅니다. 튜닝 필드(findtime, maxretry, bantime, port,
//! protocol)는 비어 있으면 각자 독립적으로 기본값이 적용됩니다.

use serde::{Deserialize, Serialize};

use baniq_core::types::short_id;

/// findtime 기본값
pub const DEFAULT_FIND_TIME: &str = "10m";
/// maxretry 기본값
pub const DEFAULT_MAX_RETRY: &str = "5";
/// bantime 기본값
pub const DEFAULT_BAN_TIME: &str = "1h";
/// port 기본값
pub const DEFAULT_PORT: &str = "0:65535";
/// protocol 기본값
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// 감옥 파일 확장자
pub const CONF_EXTENSION: &str = "conf";

/// 감옥 하나의 설정
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailConfig {
    /// 감옥 이름 (컨테이너 안에서 유일)
    pub name: String,
    /// 소유 컨테이너 이름
    pub container_name: String,
    /// 감시할 로그 경로
    pub log_path: String,
    /// 참조할 필터 이름
    pub filter: String,
    /// 인라인 필터에 붙일 이름
    pub custom_filter_name: String,
    /// 인라인 매칭 패턴
    pub fail_regex: String,
    /// 인라인 무시 패턴
    pub ignore_regex: String,
    /// 탐지 시간 창
    pub find_time: String,
    /// 허용 실패 횟수
    pub max_retry: String,
    /// 차단 시간
    pub ban_time: String,
    /// 포트 범위
    pub port: String,
    /// 프로토콜
    pub protocol: String,
}

impl JailConfig {
    /// 이름과 소유 컨테이너만 채운 빈 설정을 생성합니다.
    pub fn new(name: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container_name: container_name.into(),
            ..Self::default()
        }
    }

    /// 탐지 소스(logpath, filter, failregex) 중 하나라도 있으면 완전한 설정입니다.
    pub fn is_complete(&self) -> bool {
        !self.log_path.is_empty() || !self.filter.is_empty() || !self.fail_regex.is_empty()
    }

    /// 인라인 매칭 패턴이 있는지 확인합니다.
    pub fn has_inline_filter(&self) -> bool {
        !self.fail_regex.is_empty()
    }

    /// 비어 있는 튜닝 필드에 기본값을 채웁니다.
    pub fn with_defaults(mut self) -> Self {
        fill_default(&mut self.find_time, DEFAULT_FIND_TIME);
        fill_default(&mut self.max_retry, DEFAULT_MAX_RETRY);
        fill_default(&mut self.ban_time, DEFAULT_BAN_TIME);
        fill_default(&mut self.port, DEFAULT_PORT);
        fill_default(&mut self.protocol, DEFAULT_PROTOCOL);
        self
    }

    /// fail2ban 섹션 형식의 감옥 정의를 렌더링합니다.
    ///
    /// `enabled`는 항상 `true`로 기록됩니다.
    pub fn render(&self) -> String {
        format!(
            "[{name}]\n\
             enabled = true\n\
             filter = {filter}\n\
             logpath = {log_path}\n\
             findtime = {find_time}\n\
             maxretry = {max_retry}\n\
             bantime = {ban_time}\n\
             port = {port}\n\
             protocol = {protocol}\n",
            name = self.name,
            filter = self.filter,
            log_path = self.log_path,
            find_time = self.find_time,
            max_retry = self.max_retry,
            ban_time = self.ban_time,
            port = self.port,
            protocol = self.protocol,
        )
    }

    /// [`render`](Self::render)로 만든 감옥 정의를 다시 읽습니다.
    ///
    /// 섹션 헤더가 없으면 `None`을 반환합니다. 알 수 없는 키는 무시합니다.
    pub fn parse_rendered(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
        let header = lines.next()?;
        let name = header.strip_prefix('[')?.strip_suffix(']')?;

        let mut jail = Self::new(name, "");
        for line in lines {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_owned();
            match key.trim() {
                "filter" => jail.filter = value,
                "logpath" => jail.log_path = value,
                "findtime" => jail.find_time = value,
                "maxretry" => jail.max_retry = value,
                "bantime" => jail.ban_time = value,
                "port" => jail.port = value,
                "protocol" => jail.protocol = value,
                _ => {}
            }
        }
        Some(jail)
    }
}

fn fill_default(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_owned();
    }
}

/// 컨테이너 ID 앞 12자와 감옥 이름으로 감옥 파일 이름을 만듭니다.
///
/// 형식: `<shortId>-<jailName>.conf`
pub fn jail_file_name(container_id: &str, jail_name: &str) -> String {
    format!("{}-{jail_name}.{CONF_EXTENSION}", short_id(container_id))
}
