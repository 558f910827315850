use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};

use super::OwnerId;

pub const SESSION_ID_PREFIX: &str = "walink";

// Last millisecond stamp handed out by `next_for_owner` in this process.
static LAST_ISSUED_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Remote pairing session identifier
/// Format: "{prefix}_{owner digits}_{unix millis}"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Derive a fresh identifier for `owner` at `now`.
    ///
    /// Unique per (owner, creation instant), which is all the gateway needs to
    /// keep two sessions of the same owner apart.
    pub fn for_owner(owner: &OwnerId, now: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}_{}",
            SESSION_ID_PREFIX,
            owner.digits(),
            now.timestamp_millis()
        ))
    }

    /// Like [`SessionId::for_owner`], but never repeats a stamp within the
    /// process: a second call in the same millisecond takes the next one.
    pub fn next_for_owner(owner: &OwnerId, now: DateTime<Utc>) -> Self {
        let wanted = now.timestamp_millis();
        let previous = LAST_ISSUED_MILLIS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wanted.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        let millis = wanted.max(previous.saturating_add(1));

        Self(format!(
            "{}_{}_{}",
            SESSION_ID_PREFIX,
            owner.digits(),
            millis
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
