//! Session timeout guard
//!
//! One-shot timer on the absolute session deadline. The guard holds the
//! session's token, so a replaced or connected session never hears from it.

use chrono::{DateTime, Utc};

use super::mailbox::{ReportSink, SessionReport};

pub(crate) struct TimeoutGuard {
    pub(crate) deadline: DateTime<Utc>,
}

impl TimeoutGuard {
    pub(crate) async fn run(self, sink: ReportSink) {
        let wait = (self.deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        tokio::select! {
            biased;
            _ = sink.token().cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        tracing::info!(deadline = %self.deadline, "pairing session deadline reached");
        sink.report(SessionReport::TimeoutElapsed);
    }
}
