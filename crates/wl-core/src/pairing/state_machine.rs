//! Pairing session state machine
//!
//! 这个模块实现了配对会话的显式状态机：纯函数式状态转换
//! `(state, event) -> (new_state, actions[])`，副作用全部交给 controller 执行。
//!
//! # Architecture / 架构
//!
//! ```text
//! PairingStateMachine (wl-core)
//!   ├── State: PairingSession (state, code, generation, welcome guard)
//!   ├── Event: gateway results, timer reports, user commands
//!   └── Action: timers to start/stop, welcome to send, updates to emit
//!
//! PairingController (wl-app)
//!   ├── receives commands and timer reports on one mailbox
//!   ├── converts them into PairingEvent
//!   ├── calls the state machine for actions
//!   └── executes actions (spawn/cancel tasks, emit updates)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::session::{
    Generation, PairingCode, PairingSession, SessionNotice, SessionState, SessionUpdate,
};
use crate::ids::OwnerId;
use crate::settings::PairingSettings;

/// Where a code fetch result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshSource {
    /// Periodic QR refresh tick (single attempt).
    Scheduled,
    /// Caller-requested refresh (through the retry policy).
    Manual,
}

/// 触发状态转换的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// The controller began driving a fresh session.
    SessionStarted,

    /// First code fetch after remote creation succeeded.
    CodeObtained { code: PairingCode },

    /// Remote creation or the first code fetch failed after retries.
    CreationFailed { reason: String },

    /// Caller asked for a new code.
    RefreshStarted,

    /// A refresh fetch succeeded. `tag` is the generation it was started under.
    RefreshSucceeded {
        tag: Generation,
        source: RefreshSource,
        code: PairingCode,
    },

    /// A refresh fetch failed (after retries for manual refreshes).
    RefreshFailed {
        tag: Generation,
        source: RefreshSource,
        reason: String,
    },

    /// Remote reported the account as linked (poll or push).
    ConnectionOpened,

    /// Remote reported the link closed (push only).
    ConnectionClosed,

    /// Session deadline elapsed.
    TimeoutElapsed,

    /// Explicit disconnect.
    DisconnectRequested,

    /// Welcome notification delivery failed.
    WelcomeFailed { reason: String },
}

/// Background activity owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionTimer {
    RefreshScheduler,
    StatusPoller,
    TimeoutGuard,
    ManualRefresh,
}

/// 状态转换产生的动作
///
/// 这些动作由 controller 执行，实现状态机的副作用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingAction {
    /// Start (or restart from phase zero) the QR refresh scheduler.
    StartRefreshScheduler,

    /// Start the status poller.
    StartStatusPoller,

    /// Arm the one-shot timeout guard.
    StartTimeoutGuard { deadline: DateTime<Utc> },

    /// Cancel one background activity.
    CancelTimer { timer: SessionTimer },

    /// Cancel every background activity of the session.
    CancelAll,

    /// Deliver the welcome notification to the owner.
    SendWelcome { recipient: OwnerId },

    /// Best-effort deletion of the remote session.
    DeleteRemoteSession,

    /// Publish an update to observers.
    Emit(SessionUpdate),
}

/// Policy knobs the pure machine needs.
#[derive(Debug, Clone)]
pub struct PairingPolicy {
    /// Absolute session deadline, measured from `created_at`.
    pub session_timeout: Duration,
}

impl PairingPolicy {
    pub fn from_settings(settings: &PairingSettings) -> Self {
        let session_timeout = Duration::from_std(settings.session_timeout)
            .unwrap_or_else(|_| Duration::days(365));
        Self { session_timeout }
    }
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self::from_settings(&PairingSettings::default())
    }
}

/// State a manual refresh started from, kept so a failure can restore it.
#[derive(Debug, Clone)]
struct RefreshOrigin {
    state: SessionState,
    code: Option<PairingCode>,
}

/// 配对会话状态机
///
/// # Example / 示例
///
/// ```ignore
/// let mut sm = PairingStateMachine::new(session, PairingPolicy::default());
/// let (state, actions) = sm.handle_event(PairingEvent::CodeObtained { code });
/// ```
#[derive(Debug, Clone)]
pub struct PairingStateMachine {
    session: PairingSession,
    policy: PairingPolicy,
    refresh_origin: Option<RefreshOrigin>,
}

impl PairingStateMachine {
    pub fn new(session: PairingSession, policy: PairingPolicy) -> Self {
        Self {
            session,
            policy,
            refresh_origin: None,
        }
    }

    pub fn session(&self) -> &PairingSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn generation(&self) -> Generation {
        self.session.generation()
    }

    /// A manual refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_origin.is_some()
    }

    pub fn snapshot(&self) -> SessionUpdate {
        self.session.update(None)
    }

    /// 处理事件并返回新状态和动作列表
    ///
    /// An event that does not apply to the current state (stale generation,
    /// duplicate "connected", anything after Disconnected) yields no actions.
    pub fn handle_event(&mut self, event: PairingEvent) -> (SessionState, Vec<PairingAction>) {
        let old_state = self.session.state();
        let event_debug = format!("{:?}", event);

        let actions = self.transition(event);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            session_id = %self.session.session_id(),
            old_state = ?old_state,
            event = %event_debug,
            new_state = ?self.session.state(),
            num_actions = actions.len(),
            "pairing session transition"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = (old_state, event_debug);

        (self.session.state(), actions)
    }

    fn transition(&mut self, event: PairingEvent) -> Vec<PairingAction> {
        let state = self.session.state();
        match (state, event) {
            (SessionState::Disconnected, _) => vec![],

            // The deadline covers remote creation and the first fetch too.
            (SessionState::Creating, PairingEvent::SessionStarted)
                if self.refresh_origin.is_none()
                    && self.session.generation() == Generation::INITIAL =>
            {
                vec![PairingAction::StartTimeoutGuard {
                    deadline: self.deadline(),
                }]
            }

            (SessionState::Creating, PairingEvent::CodeObtained { code })
                if self.refresh_origin.is_none() =>
            {
                self.session.install_code(code);
                vec![
                    PairingAction::StartRefreshScheduler,
                    PairingAction::StartStatusPoller,
                    self.emit(None),
                ]
            }

            (SessionState::Creating, PairingEvent::CreationFailed { reason })
                if self.refresh_origin.is_none() =>
            {
                self.session.leave_scan(SessionState::Disconnected);
                vec![
                    PairingAction::CancelAll,
                    PairingAction::DeleteRemoteSession,
                    self.emit(Some(SessionNotice::CreationFailed { reason })),
                ]
            }

            (SessionState::AwaitingScan | SessionState::Expired, PairingEvent::RefreshStarted) => {
                let code = self.session.leave_scan(SessionState::Creating);
                self.refresh_origin = Some(RefreshOrigin { state, code });
                vec![
                    PairingAction::CancelTimer {
                        timer: SessionTimer::RefreshScheduler,
                    },
                    self.emit(None),
                ]
            }

            (
                SessionState::Creating,
                PairingEvent::RefreshSucceeded {
                    tag,
                    source: RefreshSource::Manual,
                    code,
                },
            ) if self.refresh_origin.is_some() && tag == self.session.generation() => {
                self.refresh_origin = None;
                self.session.install_code(code);
                vec![PairingAction::StartRefreshScheduler, self.emit(None)]
            }

            (
                SessionState::Creating,
                PairingEvent::RefreshFailed {
                    tag,
                    source: RefreshSource::Manual,
                    reason,
                },
            ) if self.refresh_origin.is_some() && tag == self.session.generation() => {
                let mut actions = Vec::new();
                if let Some(origin) = self.refresh_origin.take() {
                    match (origin.state, origin.code) {
                        (SessionState::AwaitingScan, Some(code)) => {
                            self.session.restore_code(code);
                            actions.push(PairingAction::StartRefreshScheduler);
                        }
                        _ => {
                            self.session.leave_scan(SessionState::Expired);
                        }
                    }
                }
                actions.push(self.emit(Some(SessionNotice::RefreshFailed { reason })));
                actions
            }

            (
                SessionState::AwaitingScan,
                PairingEvent::RefreshSucceeded {
                    tag,
                    source: RefreshSource::Scheduled,
                    code,
                },
            ) if tag == self.session.generation() => {
                self.session.install_code(code);
                vec![self.emit(None)]
            }

            (
                SessionState::AwaitingScan,
                PairingEvent::RefreshFailed {
                    tag,
                    source: RefreshSource::Scheduled,
                    reason,
                },
            ) if tag == self.session.generation() => {
                self.session.leave_scan(SessionState::Expired);
                vec![
                    PairingAction::CancelTimer {
                        timer: SessionTimer::RefreshScheduler,
                    },
                    self.emit(Some(SessionNotice::CodeExpired { reason })),
                ]
            }

            (
                SessionState::AwaitingScan | SessionState::Expired | SessionState::Creating,
                PairingEvent::ConnectionOpened,
            ) if state != SessionState::Creating || self.refresh_origin.is_some() => {
                self.refresh_origin = None;
                self.session.leave_scan(SessionState::Connected);
                let mut actions = vec![
                    PairingAction::CancelTimer {
                        timer: SessionTimer::RefreshScheduler,
                    },
                    PairingAction::CancelTimer {
                        timer: SessionTimer::ManualRefresh,
                    },
                    PairingAction::CancelTimer {
                        timer: SessionTimer::StatusPoller,
                    },
                    PairingAction::CancelTimer {
                        timer: SessionTimer::TimeoutGuard,
                    },
                    self.emit(None),
                ];
                if self.session.mark_welcome_sent() {
                    actions.push(PairingAction::SendWelcome {
                        recipient: self.session.owner().clone(),
                    });
                }
                actions
            }

            (SessionState::Connected, PairingEvent::ConnectionClosed) => {
                self.session.leave_scan(SessionState::Disconnected);
                vec![
                    PairingAction::CancelAll,
                    PairingAction::DeleteRemoteSession,
                    self.emit(Some(SessionNotice::ConnectionLost)),
                ]
            }

            (
                SessionState::AwaitingScan | SessionState::Expired | SessionState::Creating,
                PairingEvent::TimeoutElapsed,
            ) => {
                self.refresh_origin = None;
                self.session.leave_scan(SessionState::Disconnected);
                vec![
                    PairingAction::CancelAll,
                    PairingAction::DeleteRemoteSession,
                    self.emit(Some(SessionNotice::PairingTimedOut)),
                ]
            }

            (_, PairingEvent::DisconnectRequested) => {
                self.refresh_origin = None;
                self.session.leave_scan(SessionState::Disconnected);
                vec![
                    PairingAction::CancelAll,
                    PairingAction::DeleteRemoteSession,
                    self.emit(None),
                ]
            }

            (SessionState::Connected, PairingEvent::WelcomeFailed { reason }) => {
                vec![self.emit(Some(SessionNotice::NotificationFailed { reason }))]
            }

            (_state, _event) => vec![],
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.session.created_at() + self.policy.session_timeout
    }

    fn emit(&self, notice: Option<SessionNotice>) -> PairingAction {
        PairingAction::Emit(self.session.update(notice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> PairingStateMachine {
        let session = PairingSession::new(OwnerId::from("5511999999999"), Utc::now());
        PairingStateMachine::new(
            session,
            PairingPolicy {
                session_timeout: Duration::minutes(10),
            },
        )
    }

    fn awaiting_scan(code: &str) -> PairingStateMachine {
        let mut sm = machine();
        sm.handle_event(
            PairingEvent::CodeObtained {
                code: PairingCode::png_base64(code),
            },
        );
        sm
    }

    fn emitted(actions: &[PairingAction]) -> Vec<SessionUpdate> {
        actions
            .iter()
            .filter_map(|action| match action {
                PairingAction::Emit(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn code_obtained_enters_awaiting_scan_and_starts_timers() {
        let mut sm = machine();
        let (state, actions) = sm.handle_event(
            PairingEvent::CodeObtained {
                code: PairingCode::png_base64("A"),
            },
        );

        assert_eq!(state, SessionState::AwaitingScan);
        assert_eq!(sm.generation(), Generation::new(1));
        assert!(actions.contains(&PairingAction::StartRefreshScheduler));
        assert!(actions.contains(&PairingAction::StartStatusPoller));
        assert!(!actions
            .iter()
            .any(|action| matches!(action, PairingAction::StartTimeoutGuard { .. })));
        let updates = emitted(&actions);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].pairing_code.as_ref().unwrap().payload, "A");
    }

    #[test]
    fn session_start_arms_timeout_guard_once() {
        let mut sm = machine();
        let (state, actions) = sm.handle_event(PairingEvent::SessionStarted);

        assert_eq!(state, SessionState::Creating);
        assert_eq!(
            actions,
            vec![PairingAction::StartTimeoutGuard {
                deadline: sm.deadline()
            }]
        );

        let mut later = awaiting_scan("A");
        let (_, actions) = later.handle_event(PairingEvent::SessionStarted);
        assert!(actions.is_empty());
    }

    #[test]
    fn timeout_while_creating_disconnects() {
        let mut sm = machine();
        sm.handle_event(PairingEvent::SessionStarted);

        let (state, actions) = sm.handle_event(PairingEvent::TimeoutElapsed);

        assert_eq!(state, SessionState::Disconnected);
        assert!(actions.contains(&PairingAction::DeleteRemoteSession));
        assert_eq!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::PairingTimedOut)
        );
    }

    #[test]
    fn creation_failure_is_terminal_with_notice() {
        let mut sm = machine();
        let (state, actions) = sm.handle_event(
            PairingEvent::CreationFailed {
                reason: "gateway down".to_string(),
            },
        );

        assert_eq!(state, SessionState::Disconnected);
        assert!(!actions.contains(&PairingAction::StartRefreshScheduler));
        assert_eq!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::CreationFailed {
                reason: "gateway down".to_string()
            })
        );
    }

    #[test]
    fn scheduled_refresh_replaces_code_and_bumps_generation() {
        let mut sm = awaiting_scan("A");
        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshSucceeded {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                code: PairingCode::png_base64("B"),
            },
        );

        assert_eq!(state, SessionState::AwaitingScan);
        assert_eq!(sm.generation(), Generation::new(2));
        let update = &emitted(&actions)[0];
        assert_eq!(update.pairing_code.as_ref().unwrap().payload, "B");
        assert_eq!(update.generation, Generation::new(2));
    }

    #[test]
    fn stale_refresh_result_is_discarded() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(
            PairingEvent::RefreshSucceeded {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                code: PairingCode::png_base64("B"),
            },
        );

        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshSucceeded {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                code: PairingCode::png_base64("stale"),
            },
        );

        assert_eq!(state, SessionState::AwaitingScan);
        assert!(actions.is_empty());
        assert_eq!(sm.session().pairing_code().unwrap().payload, "B");
    }

    #[test]
    fn scheduled_refresh_failure_expires_code() {
        let mut sm = awaiting_scan("A");
        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshFailed {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                reason: "timeout".to_string(),
            },
        );

        assert_eq!(state, SessionState::Expired);
        assert!(sm.session().pairing_code().is_none());
        assert!(actions.contains(&PairingAction::CancelTimer {
            timer: SessionTimer::RefreshScheduler
        }));
    }

    #[test]
    fn manual_refresh_from_expired_recovers() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(
            PairingEvent::RefreshFailed {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                reason: "timeout".to_string(),
            },
        );

        let (state, _) = sm.handle_event(PairingEvent::RefreshStarted);
        assert_eq!(state, SessionState::Creating);

        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshSucceeded {
                tag: Generation::new(1),
                source: RefreshSource::Manual,
                code: PairingCode::png_base64("C"),
            },
        );

        assert_eq!(state, SessionState::AwaitingScan);
        assert_eq!(sm.generation(), Generation::new(2));
        assert!(actions.contains(&PairingAction::StartRefreshScheduler));
    }

    #[test]
    fn manual_refresh_failure_restores_previous_code() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(PairingEvent::RefreshStarted);
        assert!(sm.session().pairing_code().is_none());

        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshFailed {
                tag: Generation::new(1),
                source: RefreshSource::Manual,
                reason: "down".to_string(),
            },
        );

        assert_eq!(state, SessionState::AwaitingScan);
        assert_eq!(sm.session().pairing_code().unwrap().payload, "A");
        assert_eq!(sm.generation(), Generation::new(1));
        assert!(actions.contains(&PairingAction::StartRefreshScheduler));
        assert!(matches!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::RefreshFailed { .. })
        ));
    }

    #[test]
    fn manual_refresh_failure_from_expired_stays_expired() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(
            PairingEvent::RefreshFailed {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                reason: "timeout".to_string(),
            },
        );
        sm.handle_event(PairingEvent::RefreshStarted);

        let (state, actions) = sm.handle_event(
            PairingEvent::RefreshFailed {
                tag: Generation::new(1),
                source: RefreshSource::Manual,
                reason: "down".to_string(),
            },
        );

        assert_eq!(state, SessionState::Expired);
        assert!(!actions.contains(&PairingAction::StartRefreshScheduler));
    }

    #[test]
    fn refresh_rejected_while_creating() {
        let mut sm = machine();
        let (state, actions) = sm.handle_event(PairingEvent::RefreshStarted);
        assert_eq!(state, SessionState::Creating);
        assert!(actions.is_empty());
    }

    #[test]
    fn connection_opened_sends_welcome_exactly_once() {
        let mut sm = awaiting_scan("A");
        let (state, actions) = sm.handle_event(PairingEvent::ConnectionOpened);

        assert_eq!(state, SessionState::Connected);
        assert!(sm.session().pairing_code().is_none());
        let welcomes = actions
            .iter()
            .filter(|action| matches!(action, PairingAction::SendWelcome { .. }))
            .count();
        assert_eq!(welcomes, 1);

        let (state, actions) = sm.handle_event(PairingEvent::ConnectionOpened);
        assert_eq!(state, SessionState::Connected);
        assert!(actions.is_empty());
    }

    #[test]
    fn connection_opened_ignored_before_first_code() {
        let mut sm = machine();
        let (state, actions) = sm.handle_event(PairingEvent::ConnectionOpened);
        assert_eq!(state, SessionState::Creating);
        assert!(actions.is_empty());
    }

    #[test]
    fn timeout_disconnects_unless_connected() {
        let mut sm = awaiting_scan("A");
        let (state, actions) = sm.handle_event(PairingEvent::TimeoutElapsed);

        assert_eq!(state, SessionState::Disconnected);
        assert!(actions.contains(&PairingAction::CancelAll));
        assert_eq!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::PairingTimedOut)
        );

        let mut connected = awaiting_scan("A");
        connected.handle_event(PairingEvent::ConnectionOpened);
        let (state, actions) = connected.handle_event(PairingEvent::TimeoutElapsed);
        assert_eq!(state, SessionState::Connected);
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut sm = awaiting_scan("A");
        let (state, first) = sm.handle_event(PairingEvent::DisconnectRequested);
        assert_eq!(state, SessionState::Disconnected);
        assert_eq!(emitted(&first).len(), 1);

        let (state, second) = sm.handle_event(PairingEvent::DisconnectRequested);
        assert_eq!(state, SessionState::Disconnected);
        assert!(second.is_empty());
    }

    #[test]
    fn nothing_resurrects_a_disconnected_session() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(PairingEvent::DisconnectRequested);

        for event in [
            PairingEvent::ConnectionOpened,
            PairingEvent::RefreshSucceeded {
                tag: Generation::new(1),
                source: RefreshSource::Scheduled,
                code: PairingCode::png_base64("B"),
            },
            PairingEvent::TimeoutElapsed,
        ] {
            let (state, actions) = sm.handle_event(event);
            assert_eq!(state, SessionState::Disconnected);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn connection_closed_after_connect_is_connection_loss() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(PairingEvent::ConnectionOpened);

        let (state, actions) = sm.handle_event(PairingEvent::ConnectionClosed);

        assert_eq!(state, SessionState::Disconnected);
        assert_eq!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::ConnectionLost)
        );
    }

    #[test]
    fn connection_closed_while_waiting_is_ignored() {
        let mut sm = awaiting_scan("A");
        let (state, actions) = sm.handle_event(PairingEvent::ConnectionClosed);
        assert_eq!(state, SessionState::AwaitingScan);
        assert!(actions.is_empty());
    }

    #[test]
    fn welcome_failure_keeps_connected() {
        let mut sm = awaiting_scan("A");
        sm.handle_event(PairingEvent::ConnectionOpened);

        let (state, actions) = sm.handle_event(
            PairingEvent::WelcomeFailed {
                reason: "500".to_string(),
            },
        );

        assert_eq!(state, SessionState::Connected);
        assert!(matches!(
            emitted(&actions)[0].notice,
            Some(SessionNotice::NotificationFailed { .. })
        ));
    }
}
