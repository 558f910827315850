//! Gateway port
//!
//! Request/response capability surface of the remote pairing provider. The
//! session controller is the only consumer; implementations live in the
//! infrastructure layer (e.g. the HTTP adapter in `wl-infra`).

use async_trait::async_trait;

use super::errors::GatewayError;
use crate::ids::{OwnerId, SessionId};
use crate::pairing::PairingCode;

/// Remote connection state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub open: bool,
}

#[async_trait]
pub trait GatewayPort: Send + Sync {
    async fn create_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError>;

    async fn fetch_pairing_code(&self, session_id: &SessionId)
        -> Result<PairingCode, GatewayError>;

    async fn connection_status(
        &self,
        session_id: &SessionId,
    ) -> Result<ConnectionStatus, GatewayError>;

    async fn send_notification(
        &self,
        session_id: &SessionId,
        recipient: &OwnerId,
        text: &str,
    ) -> Result<(), GatewayError>;

    /// Best-effort; callers log failures and carry on.
    async fn delete_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError>;
}
