//! Session identity store port
//!
//! Keeps just enough about the live session of each owner to clean up a
//! leftover remote session after a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SessionStoreError;
use crate::ids::{OwnerId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub owner: OwnerId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStorePort: Send + Sync {
    async fn load(&self, owner: &OwnerId) -> Result<Option<SessionRecord>, SessionStoreError>;

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError>;

    /// Removing a missing record is not an error.
    async fn remove(&self, owner: &OwnerId) -> Result<(), SessionStoreError>;
}
