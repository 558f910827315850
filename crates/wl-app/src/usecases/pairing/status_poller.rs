//! Status poller
//!
//! Asks the gateway for the remote connection state on a fixed period.
//! "open" is reported once and ends the poller; errors are logged and the
//! next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use wl_core::ports::GatewayPort;
use wl_core::SessionId;

use super::mailbox::{ReportSink, SessionReport};

pub(crate) struct StatusPoller {
    pub(crate) gateway: Arc<dyn GatewayPort>,
    pub(crate) session_id: SessionId,
    pub(crate) period: Duration,
}

impl StatusPoller {
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

            let status = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                status = self.gateway.connection_status(&self.session_id) => status,
            };

            match status {
                Ok(status) if status.open => {
                    tracing::info!(session_id = %self.session_id, "remote session reported open");
                    sink.report(SessionReport::StatusOpen);
                    break;
                }
                Ok(_) => {
                    tracing::trace!(session_id = %self.session_id, "remote session not open yet");
                }
                Err(err) => {
                    tracing::warn!(session_id = %self.session_id, error = %err, "status poll failed");
                }
            }
        }

        tracing::debug!(session_id = %self.session_id, "status poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::pairing::test_support::{drain, session_id, sink, MockGateway};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wl_core::ports::{ConnectionStatus, GatewayError};

    #[tokio::test]
    async fn errors_are_tolerated_until_open() {
        tokio::time::pause();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut gateway = MockGateway::new();
        gateway.expect_connection_status().returning(move |_| {
            match calls_clone.fetch_add(1, Ordering::SeqCst) {
                0 => Err(GatewayError::Transient("connection reset".to_string())),
                1 => Ok(ConnectionStatus { open: false }),
                _ => Ok(ConnectionStatus { open: true }),
            }
        });

        let (sink, mut rx) = sink();
        StatusPoller {
            gateway: Arc::new(gateway),
            session_id: session_id(),
            period: Duration::from_secs(3),
        }
        .run(sink)
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(drain(&mut rx), vec![SessionReport::StatusOpen]);
    }

    #[tokio::test]
    async fn cancellation_stops_polling() {
        tokio::time::pause();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut gateway = MockGateway::new();
        gateway.expect_connection_status().returning(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(ConnectionStatus { open: false })
        });

        let (sink, mut rx) = sink();
        let token = sink.token().clone();
        let task = tokio::spawn(
            StatusPoller {
                gateway: Arc::new(gateway),
                session_id: session_id(),
                period: Duration::from_secs(3),
            }
            .run(sink),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
        task.await.unwrap();
        let polled = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(polled, 3);
        assert_eq!(calls.load(Ordering::SeqCst), polled);
        assert!(drain(&mut rx).is_empty());
    }
}
