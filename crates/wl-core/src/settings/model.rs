use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

/// Timing and retry knobs of the pairing flow.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSettings {
    /// Pause between remote creation and the first code fetch.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub settle_delay: Duration,

    /// QR refresh scheduler period.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub refresh_interval: Duration,

    /// Status poller period.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,

    /// Absolute deadline from session creation.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session_timeout: Duration,

    /// Pause between the Connected transition and the welcome send.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub welcome_delay: Duration,

    pub retry: RetrySettings,
}

/// Bounded retry used for code fetches.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub delay: Duration,

    /// 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_delay: Duration,
}
