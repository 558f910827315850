//! Pairing registry
//!
//! Owner -> live session map. The map lock is the single writer for
//! create/replace/remove; remote deletions of retired sessions run after the
//! lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};
use wl_core::ports::{SessionRecord, SessionStorePort};
use wl_core::{OwnerId, SessionId};

use super::controller::{PairingController, PairingDeps, PairingSessionHandle};
use super::errors::PairingError;

pub struct PairingRegistry {
    deps: PairingDeps,
    store: Arc<dyn SessionStorePort>,
    sessions: Mutex<HashMap<OwnerId, PairingSessionHandle>>,
}

impl PairingRegistry {
    pub fn new(deps: PairingDeps, store: Arc<dyn SessionStorePort>) -> Self {
        Self {
            deps,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session for `owner`, retiring any live one first.
    ///
    /// Resolves once the first pairing code is available.
    pub async fn create(&self, owner: OwnerId) -> Result<PairingSessionHandle, PairingError> {
        let span = info_span!("pairing.registry.create", owner = %owner);
        async {
            let (handle, pending, retired) = {
                let mut sessions = self.sessions.lock().await;
                let retired = match sessions.remove(&owner) {
                    Some(previous) => {
                        tracing::info!(
                            previous_session = %previous.session_id(),
                            "replacing live pairing session"
                        );
                        previous.begin_disconnect().await
                    }
                    None => None,
                };
                let (handle, pending) = PairingController::spawn(owner.clone(), self.deps.clone());
                sessions.insert(owner.clone(), handle.clone());
                (handle, pending, retired)
            };

            await_deletion(retired).await;

            match pending.wait().await {
                Ok(()) => {
                    let record = SessionRecord {
                        owner: owner.clone(),
                        session_id: handle.session_id().clone(),
                        created_at: handle.created_at(),
                    };
                    if let Err(err) = self.store.save(&record).await {
                        tracing::warn!(error = %err, "failed to persist session record");
                    }
                    Ok(handle)
                }
                Err(err) => {
                    self.forget(&owner, handle.session_id()).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Live session of `owner`; finished sessions are pruned on the way.
    pub async fn get(&self, owner: &OwnerId) -> Option<PairingSessionHandle> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(owner) {
            Some(handle) if handle.is_closed() => {
                sessions.remove(owner);
                None
            }
            Some(handle) => Some(handle.clone()),
            None => None,
        }
    }

    /// Tear down the owner's session, if any. Always succeeds locally.
    pub async fn disconnect(&self, owner: &OwnerId) -> Result<(), PairingError> {
        let retired = {
            let mut sessions = self.sessions.lock().await;
            match sessions.remove(owner) {
                Some(handle) => handle.begin_disconnect().await,
                None => None,
            }
        };

        await_deletion(retired).await;
        self.remove_record(owner).await;
        Ok(())
    }

    /// Detach the owner's handle without tearing the session down.
    pub async fn remove(&self, owner: &OwnerId) -> Option<PairingSessionHandle> {
        self.sessions.lock().await.remove(owner)
    }

    /// Route a pushed connection update to the session it names.
    ///
    /// Returns `false` when no live session matches.
    pub async fn route_connection_update(&self, session_id: &SessionId, open: bool) -> bool {
        let handle = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .find(|handle| handle.session_id() == session_id)
                .cloned()
        };

        match handle {
            Some(handle) => handle.report_connection(open).is_ok(),
            None => {
                tracing::debug!(%session_id, open, "connection update for unknown session");
                false
            }
        }
    }

    /// Delete a remote session left behind by an earlier run.
    ///
    /// Returns `true` when a leftover record was found and dropped.
    pub async fn cleanup_stale(&self, owner: &OwnerId) -> Result<bool, PairingError> {
        let record = self
            .store
            .load(owner)
            .await
            .map_err(|err| PairingError::Store(err.to_string()))?;
        let Some(record) = record else {
            return Ok(false);
        };

        if let Some(live) = self.get(owner).await {
            if live.session_id() == &record.session_id {
                return Ok(false);
            }
        }

        tracing::info!(session_id = %record.session_id, %owner, "cleaning up stale remote session");
        if let Err(err) = self
            .deps
            .gateway
            .delete_remote_session(&record.session_id)
            .await
        {
            tracing::warn!(session_id = %record.session_id, error = %err, "stale session deletion failed");
        }

        self.store
            .remove(owner)
            .await
            .map_err(|err| PairingError::Store(err.to_string()))?;
        Ok(true)
    }

    /// Drop a failed session, unless a newer one already took its place.
    async fn forget(&self, owner: &OwnerId, session_id: &SessionId) {
        let ours = {
            let mut sessions = self.sessions.lock().await;
            let ours = sessions
                .get(owner)
                .is_some_and(|handle| handle.session_id() == session_id);
            if ours {
                sessions.remove(owner);
            }
            ours
        };
        if ours {
            self.remove_record(owner).await;
        }
    }

    async fn remove_record(&self, owner: &OwnerId) {
        if let Err(err) = self.store.remove(owner).await {
            tracing::warn!(%owner, error = %err, "failed to remove session record");
        }
    }
}

async fn await_deletion(deletion: Option<JoinHandle<()>>) {
    if let Some(deletion) = deletion {
        if let Err(err) = deletion.await {
            tracing::warn!(error = %err, "remote deletion task failed");
        }
    }
}
