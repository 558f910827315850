use std::time::Duration;

use super::model::*;

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            refresh_interval: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            session_timeout: Duration::from_secs(10 * 60), // 10 minutes
            welcome_delay: Duration::from_secs(2),
            retry: RetrySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_settings_defaults() {
        let settings = PairingSettings::default();
        assert_eq!(settings.refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
        assert_eq!(settings.session_timeout, Duration::from_secs(600));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_pairing_settings_partial_toml_keeps_defaults() {
        let settings: PairingSettings = toml::from_str(
            r#"
            poll_interval = 5

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.delay, Duration::from_secs(2));
    }
}
