//! Container lifecycle events.
//!
//! [`ContainerEvent`] is the runtime-agnostic form of a Docker container event
//! as seen by the [`EventDispatcher`](crate::dispatcher::EventDispatcher).
//! Only `start`, `stop`, `die`, and `destroy` drive jail changes; every other
//! action is carried as [`ContainerEventKind::Other`] and ignored.
//!
//! # Examples
//!
//! ```
//! use baniq_jail_manager::{ContainerEvent, ContainerEventKind};
//!
//! let event = ContainerEvent::new("4f2a9c1b7d3e", ContainerEventKind::from_action("die"));
//! assert!(event.kind.is_teardown());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Container lifecycle event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerEventKind {
    /// 컨테이너 시작됨
    Start,
    /// 컨테이너 정지됨
    Stop,
    /// 컨테이너 프로세스 종료됨
    Die,
    /// 컨테이너 삭제됨
    Destroy,
    /// 처리 대상이 아닌 액션
    Other(String),
}

impl ContainerEventKind {
    /// Maps a Docker event action string to an event kind.
    ///
    /// Docker appends details to some actions (e.g. `exec_start: sh`), so only
    /// exact matches are recognized.
    pub fn from_action(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "die" => Self::Die,
            "destroy" => Self::Destroy,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Static label used for logs and the `action` metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
            Self::Destroy => "destroy",
            Self::Other(_) => "other",
        }
    }

    /// `stop`, `die`, and `destroy` all remove the container's jails.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Stop | Self::Die | Self::Destroy)
    }
}

impl fmt::Display for ContainerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(action) => write!(f, "other({action})"),
            kind => f.write_str(kind.as_str()),
        }
    }
}

/// Docker container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// 대상 컨테이너 ID
    pub container_id: String,
    /// 이벤트 종류
    pub kind: ContainerEventKind,
    /// 이벤트에 실린 컨테이너 이름 (있을 경우)
    pub container_name: Option<String>,
}

impl ContainerEvent {
    /// Creates an event without a container name.
    pub fn new(container_id: impl Into<String>, kind: ContainerEventKind) -> Self {
        Self {
            container_id: container_id.into(),
            kind,
            container_name: None,
        }
    }

    /// Attaches the container name reported with the event.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "container {} {}",
            baniq_core::types::short_id(&self.container_id),
            self.kind
        )?;
        if let Some(name) = &self.container_name {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}
