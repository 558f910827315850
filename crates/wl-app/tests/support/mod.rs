#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use wl_app::{PairingDeps, SessionObserver};
use wl_core::ports::{
    ConnectionStatus, GatewayError, GatewayPort, SessionRecord, SessionStoreError,
    SessionStorePort,
};
use wl_core::settings::RetrySettings;
use wl_core::{OwnerId, PairingCode, PairingSettings, SessionId, SessionState, SessionUpdate};

pub const OWNER: &str = "5511999999999";

/// Scriptable gateway: queued fetch results first, then `code-N` forever.
#[derive(Default)]
pub struct FakeGateway {
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub open: AtomicBool,
    /// Report open once this many fetches happened (0 = only via `open`).
    pub open_after_fetches: AtomicUsize,
    pub fetch_script: Mutex<VecDeque<Result<PairingCode, GatewayError>>>,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub create_error: Mutex<Option<GatewayError>>,
    /// `None` answers at once; `Some(None)` never answers.
    pub create_delay: Mutex<Option<Option<Duration>>>,
    /// Completed create and delete calls, in order.
    pub remote_log: Mutex<Vec<&'static str>>,
    pub notifications: Mutex<Vec<(SessionId, OwnerId, String)>>,
    pub notification_error: Mutex<Option<GatewayError>>,
    pub deleted: Mutex<Vec<SessionId>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn script(&self, results: Vec<Result<PairingCode, GatewayError>>) {
        self.fetch_script.lock().await.extend(results);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub async fn notification_count(&self) -> usize {
        self.notifications.lock().await.len()
    }

    pub async fn deleted(&self) -> Vec<SessionId> {
        self.deleted.lock().await.clone()
    }

    pub async fn remote_log(&self) -> Vec<&'static str> {
        self.remote_log.lock().await.clone()
    }
}

#[async_trait]
impl GatewayPort for FakeGateway {
    async fn create_remote_session(&self, _session_id: &SessionId) -> Result<(), GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().await;
        match delay {
            Some(Some(delay)) => tokio::time::sleep(delay).await,
            Some(None) => std::future::pending::<()>().await,
            None => {}
        }
        self.remote_log.lock().await.push("create");
        match self.create_error.lock().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_pairing_code(
        &self,
        _session_id: &SessionId,
    ) -> Result<PairingCode, GatewayError> {
        let delay = *self.fetch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fetch_script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(PairingCode::png_base64(format!("code-{n}"))),
        }
    }

    async fn connection_status(
        &self,
        _session_id: &SessionId,
    ) -> Result<ConnectionStatus, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let threshold = self.open_after_fetches.load(Ordering::SeqCst);
        let open = self.open.load(Ordering::SeqCst)
            || (threshold > 0 && self.fetches() >= threshold);
        Ok(ConnectionStatus { open })
    }

    async fn send_notification(
        &self,
        session_id: &SessionId,
        recipient: &OwnerId,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.notifications.lock().await.push((
            session_id.clone(),
            recipient.clone(),
            text.to_string(),
        ));
        match self.notification_error.lock().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        self.deleted.lock().await.push(session_id.clone());
        self.remote_log.lock().await.push("delete");
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    pub records: Mutex<HashMap<OwnerId, SessionRecord>>,
}

#[async_trait]
impl SessionStorePort for InMemorySessionStore {
    async fn load(&self, owner: &OwnerId) -> Result<Option<SessionRecord>, SessionStoreError> {
        Ok(self.records.lock().await.get(owner).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        self.records
            .lock()
            .await
            .insert(record.owner.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, owner: &OwnerId) -> Result<(), SessionStoreError> {
        self.records.lock().await.remove(owner);
        Ok(())
    }
}

/// Short settle/welcome delays; poll period chosen so poll ticks never land
/// on a refresh tick.
pub fn settings() -> PairingSettings {
    PairingSettings {
        settle_delay: Duration::from_secs(1),
        refresh_interval: Duration::from_secs(60),
        poll_interval: Duration::from_secs(7),
        session_timeout: Duration::from_secs(600),
        welcome_delay: Duration::from_secs(2),
        retry: RetrySettings {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(2),
        },
    }
}

pub fn deps(gateway: &Arc<FakeGateway>) -> PairingDeps {
    PairingDeps::new(gateway.clone(), settings()).with_welcome_text("welcome")
}

pub fn owner() -> OwnerId {
    OwnerId::from(OWNER)
}

/// Read updates until one in `state` arrives; returns everything read.
pub async fn collect_until(
    observer: &mut SessionObserver,
    state: SessionState,
) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Some(update) = observer.next().await {
        let done = update.state == state;
        seen.push(update);
        if done {
            return seen;
        }
    }
    panic!("stream ended before reaching {state:?}: {seen:?}");
}

pub fn payload(update: &SessionUpdate) -> Option<&str> {
    update
        .pairing_code
        .as_ref()
        .map(|code| code.payload.as_str())
}
