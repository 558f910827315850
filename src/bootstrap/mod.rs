//! Process bootstrap: configuration, tracing and dependency wiring.

pub mod config;
pub mod tracing;
pub mod wiring;

pub use config::{load_config, resolve_config};
pub use wiring::{logs_dir, wire_dependencies, AppRuntime};
