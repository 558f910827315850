//! # Configuration Loader / 配置加载器
//!
//! Reads the TOML file into the [`AppConfig`] DTO and layers environment
//! overrides on top. Mapping stays in `AppConfig::from_toml`; this module only
//! does I/O and fills in paths that depend on the host.

use std::path::{Path, PathBuf};

use anyhow::Context;
use wl_core::config::AppConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const APP_DIR_NAME: &str = "walink";

/// Overrides `[gateway] api_key`.
pub const ENV_API_KEY: &str = "WALINK_API_KEY";
/// Overrides `[gateway] base_url`.
pub const ENV_GATEWAY_URL: &str = "WALINK_GATEWAY_URL";

/// Load configuration from a TOML file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML, or if the
/// `[pairing]` table does not map onto the pairing settings.
pub fn load_config(config_path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let toml_value: toml::Value =
        toml::from_str(&content).context("Failed to parse config as TOML")?;
    AppConfig::from_toml(&toml_value)
}

/// Resolve the effective configuration for this process.
///
/// An explicit path must exist. Without one the per-user config file is used
/// when present, else an empty config. `.env` and environment overrides are
/// applied last.
pub fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_config(&path)?,
            _ => AppConfig::empty(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    if config.data_dir.as_os_str().is_empty() {
        config.data_dir = default_data_dir();
    }
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(api_key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
        config.gateway_api_key = api_key;
    }
    if let Some(base_url) = lookup(ENV_GATEWAY_URL).filter(|v| !v.is_empty()) {
        config.gateway_base_url = base_url;
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_reads_valid_toml() {
        let toml_content = r#"
            [gateway]
            base_url = "http://localhost:8080"
            api_key = "from-file"

            [storage]
            data_dir = "/tmp/walink"

            [pairing]
            poll_interval = 5
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_config(temp_file.path()).unwrap();

        assert_eq!(config.gateway_base_url, "http://localhost:8080");
        assert_eq!(config.gateway_api_key, "from-file");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/walink"));
        assert_eq!(config.pairing.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_load_config_returns_error_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[gateway\nbase_url = ").unwrap();

        let result = load_config(temp_file.path());

        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("TOML"));
    }

    #[test]
    fn test_load_config_returns_error_on_missing_file() {
        let result = load_config(Path::new("/nonexistent/walink/config.toml"));

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides_replace_gateway_fields() {
        let mut config = AppConfig::empty();
        config.gateway_api_key = "from-file".to_string();

        apply_env_overrides(&mut config, |key| match key {
            ENV_API_KEY => Some("from-env".to_string()),
            ENV_GATEWAY_URL => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.gateway_api_key, "from-env");
        assert_eq!(config.gateway_base_url, "");
    }

    #[test]
    fn test_resolve_config_fills_data_dir() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[gateway]\nbase_url = \"http://localhost\"\n")
            .unwrap();

        let config = resolve_config(Some(temp_file.path())).unwrap();

        assert!(config.data_dir.ends_with(APP_DIR_NAME));
    }
}
