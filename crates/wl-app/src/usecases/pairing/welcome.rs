//! Welcome dispatcher
//!
//! Sends the one-time welcome message after the session connects. The
//! controller decides whether to dispatch (the session's welcome flag); this
//! task only waits, sends and reports.

use std::sync::Arc;
use std::time::Duration;

use wl_core::ports::GatewayPort;
use wl_core::{OwnerId, SessionId};

use super::mailbox::{ReportSink, SessionReport};

pub const DEFAULT_WELCOME_TEXT: &str =
    "Your account is linked. You can start sending messages now.";

pub(crate) struct WelcomeDispatcher {
    pub(crate) gateway: Arc<dyn GatewayPort>,
    pub(crate) session_id: SessionId,
    pub(crate) recipient: OwnerId,
    pub(crate) text: String,
    pub(crate) delay: Duration,
}

impl WelcomeDispatcher {
    /// Skips the send entirely when the session is torn down first.
    pub(crate) async fn run(self, sink: ReportSink) {
        let token = sink.token().clone();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(session_id = %self.session_id, "welcome skipped, session torn down");
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = self
                .gateway
                .send_notification(&self.session_id, &self.recipient, &self.text) => result,
        };

        if let Err(err) = &result {
            tracing::warn!(session_id = %self.session_id, error = %err, "welcome notification failed");
        }
        sink.report(SessionReport::WelcomeFinished(
            result.map_err(|err| err.to_string()),
        ));
    }
}
