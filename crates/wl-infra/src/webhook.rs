//! Webhook payload parsing
//!
//! The gateway pushes instance events to a configured URL. Only connection
//! updates matter for pairing; everything else parses to `None`.

use serde::Deserialize;
use thiserror::Error;
use wl_core::SessionId;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("connection update without instance name")]
    MissingInstance,
}

/// Remote link state carried by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Open,
    Connecting,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub session_id: SessionId,
    pub state: RemoteState,
}

impl ConnectionUpdate {
    /// `Some(open)` for a definitive state, `None` while connecting.
    pub fn is_open(&self) -> Option<bool> {
        match self.state {
            RemoteState::Open => Some(true),
            RemoteState::Close => Some(false),
            RemoteState::Connecting => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    instance: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

fn is_connection_event(event: &str) -> bool {
    event.eq_ignore_ascii_case("connection.update") || event == "CONNECTION_UPDATE"
}

/// Parse one webhook body.
pub fn parse_webhook(body: &[u8]) -> Result<Option<ConnectionUpdate>, WebhookError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    if !is_connection_event(&envelope.event) {
        return Ok(None);
    }

    let instance = envelope
        .instance
        .or_else(|| {
            envelope
                .data
                .get("instance")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .filter(|name| !name.trim().is_empty())
        .ok_or(WebhookError::MissingInstance)?;

    let state = match envelope.data.get("state").and_then(|v| v.as_str()) {
        Some("open") => RemoteState::Open,
        Some("close") => RemoteState::Close,
        _ => RemoteState::Connecting,
    };

    Ok(Some(ConnectionUpdate {
        session_id: SessionId::from(instance),
        state,
    }))
}
