//! Dependency wiring
//!
//! Builds the concrete adapters from [`AppConfig`] and hands them to the
//! application layer as trait objects. This is the only place that names both
//! `wl-infra` types and `wl-app` types.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use wl_app::{PairingDeps, PairingRegistry};
use wl_core::config::AppConfig;
use wl_core::ports::{GatewayPort, SessionStorePort};
use wl_infra::{EvolutionConfig, EvolutionGateway, FileSessionStore};

pub const PAIRING_CODE_FILE_NAME: &str = "pairing-code.png";

/// Everything a command needs once the process is wired.
pub struct AppRuntime {
    pub config: AppConfig,
    pub registry: Arc<PairingRegistry>,
}

/// Log directory under the configured data dir.
pub fn logs_dir(config: &AppConfig) -> PathBuf {
    config.data_dir.join("logs")
}

impl AppRuntime {
    /// Where the latest pairing code image is written.
    pub fn pairing_code_path(&self) -> PathBuf {
        self.config.data_dir.join(PAIRING_CODE_FILE_NAME)
    }
}

pub fn wire_dependencies(config: AppConfig) -> anyhow::Result<AppRuntime> {
    let gateway: Arc<dyn GatewayPort> = Arc::new(
        EvolutionGateway::new(gateway_config(&config)).context("Failed to create gateway")?,
    );
    let store: Arc<dyn SessionStorePort> =
        Arc::new(FileSessionStore::with_defaults(config.data_dir.clone()));

    let mut deps = PairingDeps::new(gateway, config.pairing.clone());
    if !config.welcome_text.trim().is_empty() {
        deps = deps.with_welcome_text(config.welcome_text.clone());
    }

    tracing::debug!(
        gateway = %config.gateway_base_url,
        data_dir = %config.data_dir.display(),
        "dependencies wired"
    );

    Ok(AppRuntime {
        registry: Arc::new(PairingRegistry::new(deps, store)),
        config,
    })
}

fn gateway_config(config: &AppConfig) -> EvolutionConfig {
    let mut gateway = EvolutionConfig::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    );
    gateway.webhook_url = config.webhook_url.clone().filter(|url| !url.is_empty());
    if config.request_timeout_secs > 0 {
        gateway.request_timeout = Duration::from_secs(config.request_timeout_secs);
    }
    gateway
}
