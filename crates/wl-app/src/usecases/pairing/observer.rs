//! Observable session stream

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use wl_core::SessionUpdate;

/// Ordered, gap-free view of one session.
///
/// The first item is the state at subscription time; every applied
/// transition follows. The stream ends once the session is Disconnected.
#[derive(Debug)]
pub struct SessionObserver {
    rx: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl SessionObserver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SessionUpdate>) -> Self {
        Self { rx }
    }

    /// Observer of a session that already finished: yields `last` and ends.
    pub(crate) fn closed(last: SessionUpdate) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(last);
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<SessionUpdate> {
        self.rx.recv().await
    }
}

impl Stream for SessionObserver {
    type Item = SessionUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
