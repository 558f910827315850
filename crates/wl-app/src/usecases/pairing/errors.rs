use thiserror::Error;
use wl_core::SessionState;

/// Errors returned by pairing session commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// Remote creation or the first code fetch failed; the session is gone.
    #[error("pairing session creation failed: {0}")]
    CreationFailed(String),

    /// A manual refresh exhausted its retries; the previous state is back.
    #[error("pairing code refresh failed: {0}")]
    RefreshFailed(String),

    #[error("operation not allowed in state {state:?}")]
    InvalidState { state: SessionState },

    /// Another transition (connect, timeout) overtook the operation.
    #[error("operation superseded, session is now {state:?}")]
    Superseded { state: SessionState },

    #[error("pairing session is closed")]
    SessionClosed,

    /// The session deadline passed before the first code arrived.
    #[error("pairing session timed out")]
    TimedOut,

    #[error("session store error: {0}")]
    Store(String),
}
