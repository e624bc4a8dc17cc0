//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 데몬과 감옥 관리자가 공유하는 데이터 구조를 정의합니다.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 짧은 컨테이너 ID 길이 (Docker CLI 표기와 동일)
pub const SHORT_ID_LEN: usize = 12;

/// 컨테이너 ID의 앞 12자를 반환합니다.
///
/// ID가 12자보다 짧으면 전체 ID를 그대로 반환합니다.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// 컨테이너 정보
///
/// 런타임 inspect 결과 중 감옥 생성에 필요한 메타데이터만 담습니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (런타임이 붙이는 선행 `/`는 제거됨)
    pub name: String,
    /// 이미지명
    pub image: String,
    /// 상태 (running, exited 등)
    pub status: String,
    /// 컨테이너 라벨
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    /// 짧은 ID를 반환합니다.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) image={} status={}",
            self.name,
            self.short_id(),
            self.image,
            self.status,
        )
    }
}
