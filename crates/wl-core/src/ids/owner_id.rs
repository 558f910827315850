use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity of the person who owns a pairing session.
///
/// The messaging account is addressed by phone number, so the owner id keeps
/// the number as entered and exposes a digits-only view for addressing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Phone number with every non-digit stripped.
    pub fn digits(&self) -> String {
        self.0.chars().filter(|c| c.is_ascii_digit()).collect()
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
