#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`JailManagerError`)
//! - [`config`]: Manager configuration (`JailManagerConfig`, builder)
//! - [`jail`]: Jail configuration model, defaults, and rendering (`JailConfig`)
//! - [`labels`]: Label extraction (`extract_jail_configs`)
//! - [`filter`]: Inline filter files (`FilterGenerator`)
//! - [`fail2ban`]: fail2ban control (`Fail2banControl` trait, `Fail2banClient`)
//! - [`manager`]: Jail ownership and file lifecycle (`JailManager`)
//! - [`event`]: Container lifecycle events (`ContainerEvent`, `ContainerEventKind`)
//! - [`docker`]: Docker API abstraction (`DockerClient` trait, `BollardDockerClient`)
//! - [`dispatcher`]: Event routing and startup reconciliation (`EventDispatcher`)
//! - [`guard`]: Pipeline orchestrator (`JailGuard`, `JailGuardBuilder`)
//!
//! # Architecture
//!
//! ```text
//! Docker events --> EventDispatcher --start--> labels --> filter --> JailManager.add_jail
//!                                   --stop/die/destroy--> JailManager.remove_jails_for_container
//!                                                                  |
//!                                                         fail2ban-client reload
//! ```

pub mod config;
pub mod dispatcher;
pub mod docker;
pub mod error;
pub mod event;
pub mod fail2ban;
pub mod filter;
pub mod guard;
pub mod jail;
pub mod labels;
pub mod manager;

// --- Public API Re-exports ---

// Guard (main orchestrator)
pub use guard::{JailGuard, JailGuardBuilder};

// Configuration
pub use config::{JailManagerConfig, JailManagerConfigBuilder};

// Error
pub use error::JailManagerError;

// Jail model and extraction
pub use jail::{JailConfig, jail_file_name};
pub use labels::{LABEL_ENABLED, LABEL_PREFIX, extract_jail_configs, is_enabled};

// Filters
pub use filter::{FilterGenerator, render_filter, resolve_filter_name};

// fail2ban
pub use fail2ban::{Fail2banClient, Fail2banControl};

// Lifecycle
pub use dispatcher::EventDispatcher;
pub use manager::JailManager;

// Events
pub use event::{ContainerEvent, ContainerEventKind};

// Docker API
pub use docker::{BollardDockerClient, DockerClient, EventStream};
