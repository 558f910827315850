use async_trait::async_trait;
use mockall::mock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wl_core::ports::{ConnectionStatus, GatewayError, GatewayPort};
use wl_core::{OwnerId, PairingCode, SessionId};

use super::mailbox::{Mailbox, ReportSink, SessionReport};

mock! {
    pub Gateway {}

    #[async_trait]
    impl GatewayPort for Gateway {
        async fn create_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError>;
        async fn fetch_pairing_code(&self, session_id: &SessionId) -> Result<PairingCode, GatewayError>;
        async fn connection_status(&self, session_id: &SessionId) -> Result<ConnectionStatus, GatewayError>;
        async fn send_notification(
            &self,
            session_id: &SessionId,
            recipient: &OwnerId,
            text: &str,
        ) -> Result<(), GatewayError>;
        async fn delete_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError>;
    }
}

pub(crate) fn sink() -> (ReportSink, mpsc::UnboundedReceiver<Mailbox>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReportSink::new(tx, CancellationToken::new()), rx)
}

/// Drain every report currently queued.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<Mailbox>) -> Vec<SessionReport> {
    let mut reports = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Mailbox::Report { report, .. } = message {
            reports.push(report);
        }
    }
    reports
}

pub(crate) fn session_id() -> SessionId {
    SessionId::from("walink_5511999999999_1700000000000")
}
