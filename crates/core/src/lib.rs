//! BanIQ 공통 크레이트
//!
//! 데몬과 감옥 관리자가 함께 사용하는 에러, 설정, 도메인 타입,
//! 파이프라인 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{BaniqError, ConfigError, JailError, PipelineError};

// 설정
pub use config::BaniqConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

// 도메인 타입
pub use types::{ContainerInfo, short_id};
