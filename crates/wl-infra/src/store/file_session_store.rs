//! File-based session identity store
//!
//! Keeps one [`SessionRecord`] per owner in a JSON file in the data
//! directory, so a leftover remote session can be cleaned up after a restart.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use wl_core::ports::{SessionRecord, SessionStoreError, SessionStorePort};
use wl_core::OwnerId;

pub const DEFAULT_SESSION_STORE_FILE: &str = "sessions.json";

pub struct FileSessionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create store with custom file path
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Create store with defaults
    pub fn with_defaults(base_dir: PathBuf) -> Self {
        Self::new(base_dir.join(DEFAULT_SESSION_STORE_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, SessionRecord>, SessionStoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| SessionStoreError::Storage(format!("Failed to read session file: {e}")))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| SessionStoreError::Storage(format!("Failed to parse session file: {e}")))
    }

    async fn write_all(
        &self,
        records: &BTreeMap<String, SessionRecord>,
    ) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SessionStoreError::Storage(format!("Failed to create data dir: {e}"))
            })?;
        }

        let json = serde_json::to_string_pretty(records).map_err(|e| {
            SessionStoreError::Storage(format!("Failed to serialize sessions: {e}"))
        })?;

        let mut file = fs::File::create(&self.path)
            .await
            .map_err(|e| SessionStoreError::Storage(format!("Failed to create session file: {e}")))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| SessionStoreError::Storage(format!("Failed to write session file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| SessionStoreError::Storage(format!("Failed to sync session file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl SessionStorePort for FileSessionStore {
    async fn load(&self, owner: &OwnerId) -> Result<Option<SessionRecord>, SessionStoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(owner.as_str()))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(record.owner.as_str().to_string(), record.clone());
        self.write_all(&records).await
    }

    async fn remove(&self, owner: &OwnerId) -> Result<(), SessionStoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        if records.remove(owner.as_str()).is_none() {
            return Ok(());
        }
        self.write_all(&records).await
    }
}
