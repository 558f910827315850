//! Tracing configuration for walink
//!
//! Installs a global `tracing-subscriber` registry with an env filter, a
//! stdout layer and, when the log directory is writable, a non-blocking file
//! layer.
//!
//! Output format: `2025-01-15 10:30:45.123 INFO [file.rs:42] [target] message`

use std::{fs, io, path::Path, sync::OnceLock};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, prelude::*, registry, EnvFilter};

pub const LOG_FILE_NAME: &str = "walink.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Check if running in development environment
fn is_development() -> bool {
    cfg!(debug_assertions)
}

/// Build the default filter directives for tracing
///
/// Debug for the walink crates in development, info in release. HTTP client
/// internals stay at warn either way.
fn build_filter_directives(is_dev: bool) -> Vec<String> {
    let level = if is_dev { "debug" } else { "info" };
    vec![
        "info".to_string(),
        format!("walink={level}"),
        format!("walink_lib={level}"),
        format!("wl_core={level}"),
        format!("wl_app={level}"),
        format!("wl_infra={level}"),
        "tower_http=info".to_string(),
        "hyper=warn".to_string(),
        "reqwest=warn".to_string(),
    ]
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` overrides the default directives. File logging falls back to
/// stdout only when the log directory cannot be created.
///
/// # Errors
///
/// Returns `Err` if a global subscriber is already registered.
pub fn init_tracing_subscriber(logs_dir: &Path) -> anyhow::Result<()> {
    let filter_directives = build_filter_directives(is_development());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives.join(",")));

    let stdout_writer: BoxMakeWriter = BoxMakeWriter::new(io::stdout);
    let file_writer = match build_file_writer(logs_dir) {
        Ok(writer) => Some(writer),
        Err(err) => {
            eprintln!("Failed to initialize file logging, falling back to stdout: {err}");
            None
        }
    };

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_ansi(cfg!(not(test)))
        .with_writer(stdout_writer);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_timer(fmt::time::ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
    });

    let subscriber = registry().with(env_filter).with(stdout_layer);

    if let Some(layer) = file_layer {
        subscriber.with(layer).try_init()?;
    } else {
        subscriber.try_init()?;
    }

    Ok(())
}

fn build_file_writer(logs_dir: &Path) -> anyhow::Result<NonBlocking> {
    fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    LOG_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Tracing log guard already initialized"))?;

    Ok(non_blocking)
}
