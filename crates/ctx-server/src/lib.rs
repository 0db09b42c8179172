//! # ctx-server
//!
//! Wiring and module lifecycle for the context server.
//!
//! [`ContextServer`] builds the registry, store, condition evaluator and
//! goal engine from a [`ServerConfig`] and applies module activation and
//! deactivation to them in order. Modules come from disk as
//! [`DirectoryModule`]s; lifecycle events are delivered to a single
//! [`LifecycleActor`] task.
//!
//! ## Key components
//!
//! - [`ServerConfig`] — `.ctx/server.toml` with `.ctx/` layout defaults
//! - [`DirectoryModule`] — a module laid out as `<module>/<namespace>/*.json`
//! - [`ContextServer`] — the services, wired, plus `activate` / `deactivate`
//! - [`LifecycleActor`] / [`LifecycleHandle`] — ordered lifecycle commands over a tokio channel

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod module_dir;
pub mod server;

pub use config::{GoalsConfig, LogConfig, ReportConfig, ServerConfig};
pub use error::ServerError;
pub use lifecycle::{LifecycleActor, LifecycleCommand, LifecycleHandle};
pub use module_dir::DirectoryModule;
pub use server::{ActivationReport, ContextServer, DeactivationReport};
