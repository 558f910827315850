use thiserror::Error;

/// Failure of a gateway call, classified by whether repeating it can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network/timeout class; retried by the retry policy or tolerated by the poller.
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// e.g. remote session not found; never retried blindly.
    #[error("permanent gateway error: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session record not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),
}
