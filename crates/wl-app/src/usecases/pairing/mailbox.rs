//! Controller mailbox
//!
//! Commands from handles and reports from background tasks share one queue,
//! so the controller applies everything in acceptance order.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wl_core::pairing::RefreshSource;
use wl_core::ports::{GatewayError, GatewayPort};
use wl_core::{Generation, PairingCode, SessionId};

use super::errors::PairingError;
use super::observer::SessionObserver;

pub(crate) enum Mailbox {
    Command(SessionCommand),
    /// `token` is the reporting task's token; a cancelled token means the
    /// report is stale and gets dropped.
    Report {
        token: CancellationToken,
        report: SessionReport,
    },
}

pub(crate) enum SessionCommand {
    Refresh {
        reply: oneshot::Sender<Result<(), PairingError>>,
    },
    /// Replies with the remote deletion task, if this call started one.
    Disconnect {
        reply: oneshot::Sender<Option<JoinHandle<()>>>,
    },
    Subscribe {
        reply: oneshot::Sender<SessionObserver>,
    },
    ReportConnection {
        open: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionReport {
    /// Remote creation, settle delay and first code fetch finished.
    Bootstrapped(Result<PairingCode, String>),
    RefreshFetched {
        tag: Generation,
        source: RefreshSource,
        result: Result<PairingCode, String>,
    },
    StatusOpen,
    TimeoutElapsed,
    WelcomeFinished(Result<(), String>),
}

/// Report channel handed to each background task, bound to its token.
#[derive(Clone)]
pub(crate) struct ReportSink {
    tx: mpsc::UnboundedSender<Mailbox>,
    token: CancellationToken,
}

impl ReportSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Mailbox>, token: CancellationToken) -> Self {
        Self { tx, token }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `false` once the task should stop: its token was cancelled or
    /// the controller is gone.
    pub(crate) fn report(&self, report: SessionReport) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.tx
            .send(Mailbox::Report {
                token: self.token.clone(),
                report,
            })
            .is_ok()
    }
}

/// Fetch a pairing code, treating a blank payload as a transient failure.
pub(crate) async fn fetch_code(
    gateway: &dyn GatewayPort,
    session_id: &SessionId,
) -> Result<PairingCode, GatewayError> {
    let code = gateway.fetch_pairing_code(session_id).await?;
    if code.is_empty() {
        return Err(GatewayError::Transient(
            "gateway returned an empty pairing code".to_string(),
        ));
    }
    Ok(code)
}
