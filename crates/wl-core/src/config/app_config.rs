use std::path::PathBuf;

use anyhow::Context;

use crate::settings::PairingSettings;

/// Application configuration DTO (pure data, no logic)
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gateway base URL (may be empty - this is a fact, not an error)
    pub gateway_base_url: String,

    /// Gateway API key, sent as the `apikey` header
    pub gateway_api_key: String,

    /// Webhook the gateway should push connection updates to
    pub webhook_url: Option<String>,

    /// Per-request timeout; 0 means "not configured"
    pub request_timeout_secs: u64,

    /// Data directory (path info only, no existence check)
    pub data_dir: PathBuf,

    /// Welcome text override; empty means "use the built-in text"
    pub welcome_text: String,

    pub pairing: PairingSettings,
}

impl AppConfig {
    /// Create AppConfig from TOML value
    ///
    /// Missing keys map to empty values. Only a malformed `[pairing]` table is
    /// an error, since its durations cannot be represented otherwise.
    pub fn from_toml(toml_value: &toml::Value) -> anyhow::Result<Self> {
        let gateway = toml_value.get("gateway");
        let pairing = match toml_value.get("pairing") {
            Some(value) => value
                .clone()
                .try_into::<PairingSettings>()
                .context("Failed to parse [pairing] section")?,
            None => PairingSettings::default(),
        };

        Ok(Self {
            gateway_base_url: gateway
                .and_then(|g| g.get("base_url"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            gateway_api_key: gateway
                .and_then(|g| g.get("api_key"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            webhook_url: gateway
                .and_then(|g| g.get("webhook_url"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            request_timeout_secs: gateway
                .and_then(|g| g.get("request_timeout_secs"))
                .and_then(|v| v.as_integer())
                .unwrap_or(0)
                .max(0) as u64,
            data_dir: PathBuf::from(
                toml_value
                    .get("storage")
                    .and_then(|s| s.get("data_dir"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
            ),
            welcome_text: toml_value
                .get("welcome")
                .and_then(|w| w.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            pairing,
        })
    }

    /// Create empty AppConfig (all empty/default values)
    pub fn empty() -> Self {
        Self {
            gateway_base_url: String::new(),
            gateway_api_key: String::new(),
            webhook_url: None,
            request_timeout_secs: 0,
            data_dir: PathBuf::new(),
            welcome_text: String::new(),
            pairing: PairingSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_toml_maps_all_sections() {
        let value: toml::Value = toml::from_str(
            r#"
            [gateway]
            base_url = "https://gateway.example"
            api_key = "secret"
            webhook_url = "https://hooks.example/walink"
            request_timeout_secs = 15

            [storage]
            data_dir = "/var/lib/walink"

            [welcome]
            text = "hi"

            [pairing]
            refresh_interval = 30
            session_timeout = 300
            "#,
        )
        .unwrap();

        let config = AppConfig::from_toml(&value).unwrap();

        assert_eq!(config.gateway_base_url, "https://gateway.example");
        assert_eq!(config.gateway_api_key, "secret");
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.example/walink")
        );
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/walink"));
        assert_eq!(config.welcome_text, "hi");
        assert_eq!(config.pairing.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.pairing.session_timeout, Duration::from_secs(300));
        assert_eq!(config.pairing.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_from_toml_missing_values_are_empty() {
        let value: toml::Value = toml::from_str("[gateway]\n").unwrap();

        let config = AppConfig::from_toml(&value).unwrap();

        assert_eq!(config.gateway_base_url, "");
        assert_eq!(config.gateway_api_key, "");
        assert!(config.webhook_url.is_none());
        assert_eq!(config.data_dir, PathBuf::new());
        assert_eq!(config.pairing, PairingSettings::default());
    }

    #[test]
    fn test_from_toml_rejects_malformed_pairing_table() {
        let value: toml::Value = toml::from_str(
            r#"
            [pairing]
            poll_interval = "soon"
            "#,
        )
        .unwrap();

        assert!(AppConfig::from_toml(&value).is_err());
    }
}
