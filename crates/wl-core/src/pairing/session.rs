//! Pairing session domain model
//!
//! 配对会话的领域模型：状态、配对码、代数计数器以及对外可观察的更新。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, SessionId};

/// Lifecycle state of a pairing session.
///
/// 配对会话的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Remote session or a new pairing code is being obtained.
    ///
    /// 正在创建远端会话或获取新的配对码。
    Creating,
    /// A pairing code is on display and waiting to be scanned.
    ///
    /// 配对码已展示，等待扫描。
    AwaitingScan,
    /// The messaging account is linked.
    ///
    /// 已连接。
    Connected,
    /// The last scheduled code refresh failed; a manual refresh can recover.
    ///
    /// 配对码已过期，可手动刷新恢复。
    Expired,
    /// Terminal state, no outgoing transitions.
    ///
    /// 终态。
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    /// States from which a manual code refresh may start.
    pub fn accepts_refresh(&self) -> bool {
        matches!(self, SessionState::AwaitingScan | SessionState::Expired)
    }
}

/// How a pairing code payload should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderHint {
    /// Base64-encoded PNG bitmap.
    PngBase64,
    /// Raw text to be encoded as a QR code by the renderer.
    Text,
}

/// Scan-able pairing payload issued by the gateway.
///
/// Replaced wholesale on every refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingCode {
    pub payload: String,
    pub raw_code: Option<String>,
    pub render_hint: RenderHint,
}

impl PairingCode {
    pub fn png_base64(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            raw_code: None,
            render_hint: RenderHint::PngBase64,
        }
    }

    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            raw_code: None,
            render_hint: RenderHint::Text,
        }
    }

    pub fn with_raw_code(mut self, raw_code: impl Into<String>) -> Self {
        self.raw_code = Some(raw_code.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payload.trim().is_empty()
    }
}

/// Monotonic counter of successful code fetches for one session.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-transition facts surfaced alongside a session update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionNotice {
    /// Remote session creation or the first code fetch failed for good.
    CreationFailed { reason: String },
    /// A manual refresh exhausted its retries; prior state was restored.
    RefreshFailed { reason: String },
    /// A scheduled refresh failed and the code expired.
    CodeExpired { reason: String },
    /// The welcome notification could not be delivered.
    NotificationFailed { reason: String },
    /// The session never completed pairing before its deadline.
    PairingTimedOut,
    /// The gateway reported the linked account went away.
    ConnectionLost,
}

/// One entry of the observable session stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub session_id: SessionId,
    pub state: SessionState,
    pub pairing_code: Option<PairingCode>,
    pub generation: Generation,
    pub notice: Option<SessionNotice>,
}

/// The central pairing entity.
///
/// Only the session controller mutates it; timers report results instead of
/// writing here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSession {
    session_id: SessionId,
    owner: OwnerId,
    state: SessionState,
    pairing_code: Option<PairingCode>,
    generation: Generation,
    welcome_sent: bool,
    created_at: DateTime<Utc>,
}

impl PairingSession {
    pub fn new(owner: OwnerId, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::next_for_owner(&owner, created_at),
            owner,
            state: SessionState::Creating,
            pairing_code: None,
            generation: Generation::INITIAL,
            welcome_sent: false,
            created_at,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pairing_code(&self) -> Option<&PairingCode> {
        self.pairing_code.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn welcome_sent(&self) -> bool {
        self.welcome_sent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Enter AwaitingScan with a freshly fetched code, bumping the generation.
    pub(crate) fn install_code(&mut self, code: PairingCode) {
        self.generation = self.generation.next();
        self.pairing_code = Some(code);
        self.state = SessionState::AwaitingScan;
    }

    /// Move to a state other than AwaitingScan, clearing the code.
    pub(crate) fn leave_scan(&mut self, state: SessionState) -> Option<PairingCode> {
        debug_assert!(state != SessionState::AwaitingScan);
        self.state = state;
        self.pairing_code.take()
    }

    /// Return to AwaitingScan with a code that was already issued under the
    /// current generation.
    pub(crate) fn restore_code(&mut self, code: PairingCode) {
        self.pairing_code = Some(code);
        self.state = SessionState::AwaitingScan;
    }

    /// Flip the welcome guard; returns `true` only the first time.
    pub(crate) fn mark_welcome_sent(&mut self) -> bool {
        if self.welcome_sent {
            return false;
        }
        self.welcome_sent = true;
        true
    }

    pub fn update(&self, notice: Option<SessionNotice>) -> SessionUpdate {
        SessionUpdate {
            session_id: self.session_id.clone(),
            state: self.state,
            pairing_code: self.pairing_code.clone(),
            generation: self.generation,
            notice,
        }
    }
}
