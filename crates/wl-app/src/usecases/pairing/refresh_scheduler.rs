//! QR refresh scheduler
//!
//! Periodically re-issues the pairing code while the session awaits a scan.
//! Each tick is a single attempt; the result goes back to the controller
//! tagged with the generation current when the fetch started.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use wl_core::pairing::RefreshSource;
use wl_core::ports::GatewayPort;
use wl_core::{SessionId, SessionUpdate};

use super::mailbox::{fetch_code, ReportSink, SessionReport};

pub(crate) struct RefreshScheduler {
    pub(crate) gateway: Arc<dyn GatewayPort>,
    pub(crate) session_id: SessionId,
    pub(crate) period: Duration,
    pub(crate) current: watch::Receiver<SessionUpdate>,
}

impl RefreshScheduler {
    /// Runs until cancelled, the controller goes away, or a fetch fails.
    pub(crate) async fn run(self, sink: ReportSink) {
        let token = sink.token().clone();
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let tag = self.current.borrow().generation;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = fetch_code(self.gateway.as_ref(), &self.session_id) => result,
            };

            let failed = result.is_err();
            if let Err(err) = &result {
                tracing::warn!(session_id = %self.session_id, generation = %tag, error = %err, "scheduled code refresh failed");
            }

            let delivered = sink.report(SessionReport::RefreshFetched {
                tag,
                source: RefreshSource::Scheduled,
                result: result.map_err(|err| err.to_string()),
            });
            if !delivered || failed {
                break;
            }
        }

        tracing::debug!(session_id = %self.session_id, "refresh scheduler stopped");
    }
}
