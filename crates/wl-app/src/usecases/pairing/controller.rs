//! Pairing session controller
//!
//! 这个模块负责驱动单个配对会话：把命令和后台任务的汇报转换为状态机事件，
//! 并执行状态机返回的动作。
//!
//! # Architecture / 架构
//!
//! ```text
//! PairingSessionHandle (commands)     background tasks (reports)
//!            \                               /
//!             +------> mailbox (mpsc) <-----+
//!                         ↓
//!               PairingController (actor, single writer)
//!                         ↓
//!               PairingStateMachine (pure transitions)
//!                         ↓
//!     PairingActions: spawn/cancel tasks, welcome, delete, emit
//! ```
//!
//! Gateway calls never run on the actor itself. Every background task owns a
//! child token of the session token; a report whose token was cancelled is
//! dropped before it reaches the state machine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use wl_core::pairing::{
    PairingAction, PairingEvent, PairingPolicy, PairingStateMachine, RefreshSource, SessionTimer,
};
use wl_core::ports::GatewayPort;
use wl_core::{
    Generation, OwnerId, PairingSession, PairingSettings, SessionId, SessionState, SessionUpdate,
};

use super::errors::PairingError;
use super::mailbox::{fetch_code, Mailbox, ReportSink, SessionCommand, SessionReport};
use super::observer::SessionObserver;
use super::refresh_scheduler::RefreshScheduler;
use super::retry::{RetryError, RetryPolicy};
use super::status_poller::StatusPoller;
use super::timeout_guard::TimeoutGuard;
use super::welcome::{WelcomeDispatcher, DEFAULT_WELCOME_TEXT};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct PairingDeps {
    pub gateway: Arc<dyn GatewayPort>,
    pub settings: PairingSettings,
    pub welcome_text: String,
}

impl PairingDeps {
    pub fn new(gateway: Arc<dyn GatewayPort>, settings: PairingSettings) -> Self {
        Self {
            gateway,
            settings,
            welcome_text: DEFAULT_WELCOME_TEXT.to_string(),
        }
    }

    pub fn with_welcome_text(mut self, text: impl Into<String>) -> Self {
        self.welcome_text = text.into();
        self
    }
}

/// Outcome of the first code fetch of a freshly spawned session.
pub struct PendingCreation {
    rx: oneshot::Receiver<Result<(), PairingError>>,
}

impl PendingCreation {
    /// Resolves once the session reaches AwaitingScan or fails to.
    pub async fn wait(self) -> Result<(), PairingError> {
        self.rx.await.unwrap_or(Err(PairingError::SessionClosed))
    }
}

/// Cheap, cloneable front of a running session.
#[derive(Clone)]
pub struct PairingSessionHandle {
    session_id: SessionId,
    owner: OwnerId,
    created_at: DateTime<Utc>,
    mailbox: mpsc::UnboundedSender<Mailbox>,
    latest: watch::Receiver<SessionUpdate>,
}

impl PairingSessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last applied view, without subscribing.
    pub fn snapshot(&self) -> SessionUpdate {
        self.latest.borrow().clone()
    }

    /// The controller has finished (the session is Disconnected).
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Request a new pairing code. Allowed in AwaitingScan and Expired.
    pub async fn refresh_code(&self) -> Result<(), PairingError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Refresh { reply })?;
        rx.await.unwrap_or(Err(PairingError::SessionClosed))
    }

    /// Tear the session down and wait for the best-effort remote deletion.
    ///
    /// Always succeeds locally; calling it on a closed session is a no-op.
    pub async fn disconnect(&self) -> Result<(), PairingError> {
        if let Some(deletion) = self.begin_disconnect().await {
            if let Err(err) = deletion.await {
                tracing::warn!(session_id = %self.session_id, error = %err, "remote deletion task failed");
            }
        }
        Ok(())
    }

    /// Tear down locally; the remote deletion keeps running in the returned task.
    pub(crate) async fn begin_disconnect(&self) -> Option<JoinHandle<()>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Disconnect { reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Subscribe to the session: current state first, then every transition.
    pub async fn observe(&self) -> SessionObserver {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionCommand::Subscribe { reply }).is_ok() {
            if let Ok(observer) = rx.await {
                return observer;
            }
        }
        SessionObserver::closed(self.snapshot())
    }

    /// Push notification from the gateway (webhook).
    pub fn report_connection(&self, open: bool) -> Result<(), PairingError> {
        self.send(SessionCommand::ReportConnection { open })
    }

    fn send(&self, command: SessionCommand) -> Result<(), PairingError> {
        self.mailbox
            .send(Mailbox::Command(command))
            .map_err(|_| PairingError::SessionClosed)
    }
}

/// 配对会话控制器
///
/// Single writer of one [`PairingSession`]. Runs as its own task until the
/// session is Disconnected.
pub struct PairingController {
    machine: PairingStateMachine,
    deps: PairingDeps,
    retry: RetryPolicy,
    session_token: CancellationToken,
    timers: HashMap<SessionTimer, CancellationToken>,
    mailbox_tx: mpsc::UnboundedSender<Mailbox>,
    mailbox: mpsc::UnboundedReceiver<Mailbox>,
    observers: Vec<mpsc::UnboundedSender<SessionUpdate>>,
    latest: watch::Sender<SessionUpdate>,
    pending_create: Option<oneshot::Sender<Result<(), PairingError>>>,
    pending_refresh: Option<oneshot::Sender<Result<(), PairingError>>>,
    remote_deletion: Option<JoinHandle<()>>,
    // Flips to true once the remote create request has returned (or never ran).
    creation_settled: watch::Receiver<bool>,
    creation_settled_tx: Option<watch::Sender<bool>>,
}

impl PairingController {
    /// Create a session and wait for its first pairing code.
    pub async fn create(
        owner: OwnerId,
        deps: PairingDeps,
    ) -> Result<PairingSessionHandle, PairingError> {
        let (handle, pending) = Self::spawn(owner, deps);
        pending.wait().await?;
        Ok(handle)
    }

    /// Start a session without waiting for the first code.
    pub fn spawn(owner: OwnerId, deps: PairingDeps) -> (PairingSessionHandle, PendingCreation) {
        let session = PairingSession::new(owner.clone(), Utc::now());
        let session_id = session.session_id().clone();
        let machine = PairingStateMachine::new(session, PairingPolicy::from_settings(&deps.settings));

        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let (latest, latest_rx) = watch::channel(machine.snapshot());
        let (ready_tx, ready_rx) = oneshot::channel();
        let (creation_settled_tx, creation_settled) = watch::channel(false);

        let handle = PairingSessionHandle {
            session_id: session_id.clone(),
            owner: owner.clone(),
            created_at: machine.session().created_at(),
            mailbox: mailbox_tx.clone(),
            latest: latest_rx,
        };

        let controller = Self {
            machine,
            retry: RetryPolicy::from_settings(&deps.settings.retry),
            deps,
            session_token: CancellationToken::new(),
            timers: HashMap::new(),
            mailbox_tx,
            mailbox,
            observers: Vec::new(),
            latest,
            pending_create: Some(ready_tx),
            pending_refresh: None,
            remote_deletion: None,
            creation_settled,
            creation_settled_tx: Some(creation_settled_tx),
        };

        let span = info_span!("pairing.session", session_id = %session_id, owner = %owner);
        tokio::spawn(controller.run().instrument(span));

        (handle, PendingCreation { rx: ready_rx })
    }

    async fn run(mut self) {
        tracing::info!("pairing session started");
        self.apply(PairingEvent::SessionStarted);
        self.start_bootstrap();

        while let Some(message) = self.mailbox.recv().await {
            match message {
                Mailbox::Command(command) => self.handle_command(command),
                Mailbox::Report { token, report } => {
                    if token.is_cancelled() {
                        tracing::debug!(?report, "dropping report from cancelled task");
                        continue;
                    }
                    self.handle_report(report);
                }
            }

            self.settle_pending();
            if self.machine.state().is_terminal() {
                break;
            }
        }

        self.session_token.cancel();
        self.observers.clear();
        tracing::info!("pairing session closed");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Refresh { reply } => {
                let state = self.machine.state();
                if !state.accepts_refresh() || self.pending_refresh.is_some() {
                    let _ = reply.send(Err(PairingError::InvalidState { state }));
                    return;
                }

                self.apply(PairingEvent::RefreshStarted);
                self.pending_refresh = Some(reply);
                self.start_manual_refresh(self.machine.generation());
            }
            SessionCommand::Disconnect { reply } => {
                self.apply(PairingEvent::DisconnectRequested);
                let _ = reply.send(self.remote_deletion.take());
            }
            SessionCommand::Subscribe { reply } => {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(self.machine.snapshot());
                self.observers.push(tx);
                let _ = reply.send(SessionObserver::new(rx));
            }
            SessionCommand::ReportConnection { open } => {
                let event = if open {
                    PairingEvent::ConnectionOpened
                } else {
                    PairingEvent::ConnectionClosed
                };
                self.apply(event);
            }
        }
    }

    fn handle_report(&mut self, report: SessionReport) {
        match report {
            SessionReport::Bootstrapped(Ok(code)) => {
                self.apply(PairingEvent::CodeObtained { code });
            }
            SessionReport::Bootstrapped(Err(reason)) => {
                tracing::warn!(%reason, "pairing session creation failed");
                self.apply(PairingEvent::CreationFailed {
                    reason: reason.clone(),
                });
                if let Some(reply) = self.pending_create.take() {
                    let _ = reply.send(Err(PairingError::CreationFailed(reason)));
                }
            }
            SessionReport::RefreshFetched {
                tag,
                source,
                result,
            } => {
                let outcome = result
                    .as_ref()
                    .map(|_| ())
                    .map_err(|reason| PairingError::RefreshFailed(reason.clone()));
                let event = match result {
                    Ok(code) => PairingEvent::RefreshSucceeded { tag, source, code },
                    Err(reason) => PairingEvent::RefreshFailed {
                        tag,
                        source,
                        reason,
                    },
                };
                self.apply(event);

                if source == RefreshSource::Manual && !self.machine.is_refreshing() {
                    if let Some(reply) = self.pending_refresh.take() {
                        let _ = reply.send(outcome);
                    }
                }
            }
            SessionReport::StatusOpen => {
                self.apply(PairingEvent::ConnectionOpened);
            }
            SessionReport::TimeoutElapsed => {
                if self.apply(PairingEvent::TimeoutElapsed).is_terminal() {
                    if let Some(reply) = self.pending_create.take() {
                        let _ = reply.send(Err(PairingError::TimedOut));
                    }
                }
            }
            SessionReport::WelcomeFinished(Ok(())) => {
                tracing::info!("welcome notification delivered");
            }
            SessionReport::WelcomeFinished(Err(reason)) => {
                self.apply(PairingEvent::WelcomeFailed { reason });
            }
        }
    }

    /// Answer callers whose operation was decided by some other transition.
    fn settle_pending(&mut self) {
        let state = self.machine.state();

        if state != SessionState::Creating {
            if let Some(reply) = self.pending_create.take() {
                let result = if state.is_terminal() {
                    Err(PairingError::SessionClosed)
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
        }

        if !self.machine.is_refreshing() {
            if let Some(reply) = self.pending_refresh.take() {
                let err = if state.is_terminal() {
                    PairingError::SessionClosed
                } else {
                    PairingError::Superseded { state }
                };
                let _ = reply.send(Err(err));
            }
        }
    }

    fn apply(&mut self, event: PairingEvent) -> SessionState {
        let (state, actions) = self.machine.handle_event(event);
        for action in actions {
            self.execute_action(action);
        }
        state
    }

    /// 执行单个动作
    fn execute_action(&mut self, action: PairingAction) {
        match action {
            PairingAction::StartRefreshScheduler => {
                let sink = self.start_timer(SessionTimer::RefreshScheduler);
                let scheduler = RefreshScheduler {
                    gateway: self.deps.gateway.clone(),
                    session_id: self.session_id().clone(),
                    period: self.deps.settings.refresh_interval,
                    current: self.latest.subscribe(),
                };
                tokio::spawn(scheduler.run(sink).in_current_span());
            }
            PairingAction::StartStatusPoller => {
                let sink = self.start_timer(SessionTimer::StatusPoller);
                let poller = StatusPoller {
                    gateway: self.deps.gateway.clone(),
                    session_id: self.session_id().clone(),
                    period: self.deps.settings.poll_interval,
                };
                tokio::spawn(poller.run(sink).in_current_span());
            }
            PairingAction::StartTimeoutGuard { deadline } => {
                let sink = self.start_timer(SessionTimer::TimeoutGuard);
                tokio::spawn(TimeoutGuard { deadline }.run(sink).in_current_span());
            }
            PairingAction::CancelTimer { timer } => {
                if let Some(token) = self.timers.remove(&timer) {
                    token.cancel();
                }
            }
            PairingAction::CancelAll => {
                self.session_token.cancel();
                self.timers.clear();
            }
            PairingAction::SendWelcome { recipient } => {
                let sink = ReportSink::new(self.mailbox_tx.clone(), self.session_token.child_token());
                let dispatcher = WelcomeDispatcher {
                    gateway: self.deps.gateway.clone(),
                    session_id: self.session_id().clone(),
                    recipient,
                    text: self.deps.welcome_text.clone(),
                    delay: self.deps.settings.welcome_delay,
                };
                tokio::spawn(dispatcher.run(sink).in_current_span());
            }
            PairingAction::DeleteRemoteSession => {
                let gateway = self.deps.gateway.clone();
                let session_id = self.session_id().clone();
                let mut creation_settled = self.creation_settled.clone();
                let deletion = tokio::spawn(
                    async move {
                        // A create still in flight would land after the delete.
                        let _ = creation_settled.wait_for(|settled| *settled).await;
                        match gateway.delete_remote_session(&session_id).await {
                            Ok(()) => tracing::info!("remote session deleted"),
                            Err(err) => {
                                tracing::warn!(error = %err, "remote session deletion failed")
                            }
                        }
                    }
                    .in_current_span(),
                );
                self.remote_deletion = Some(deletion);
            }
            PairingAction::Emit(update) => self.publish(update),
        }
    }

    /// Replace the task of `timer` with a fresh child token.
    fn start_timer(&mut self, timer: SessionTimer) -> ReportSink {
        let token = self.session_token.child_token();
        if let Some(previous) = self.timers.insert(timer, token.clone()) {
            previous.cancel();
        }
        ReportSink::new(self.mailbox_tx.clone(), token)
    }

    fn publish(&mut self, update: SessionUpdate) {
        tracing::info!(
            state = ?update.state,
            generation = %update.generation,
            notice = ?update.notice,
            "session update"
        );
        self.latest.send_replace(update.clone());
        self.observers
            .retain(|observer| observer.send(update.clone()).is_ok());
    }

    /// Remote creation, settle delay, then the first code fetch under retry.
    fn start_bootstrap(&mut self) {
        let sink = ReportSink::new(self.mailbox_tx.clone(), self.session_token.child_token());
        let gateway = self.deps.gateway.clone();
        let session_id = self.session_id().clone();
        let settle_delay = self.deps.settings.settle_delay;
        let retry = self.retry.clone();
        let creation_settled = self.creation_settled_tx.take();

        tokio::spawn(
            async move {
                let token = sink.token().clone();

                // Not cancellable once sent: the request may already be on the wire.
                let created = if token.is_cancelled() {
                    None
                } else {
                    Some(gateway.create_remote_session(&session_id).await)
                };
                if let Some(settled) = creation_settled {
                    settled.send_replace(true);
                }
                let Some(created) = created else { return };
                if token.is_cancelled() {
                    tracing::debug!("remote session created after teardown");
                    return;
                }
                if let Err(err) = created {
                    sink.report(SessionReport::Bootstrapped(Err(format!(
                        "remote session creation failed: {err}"
                    ))));
                    return;
                }
                tracing::debug!(settle_ms = settle_delay.as_millis() as u64, "remote session created");

                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(settle_delay) => {}
                }

                let gateway = gateway.as_ref();
                let id = &session_id;
                match retry.run(&token, move |_| fetch_code(gateway, id)).await {
                    Ok(code) => {
                        sink.report(SessionReport::Bootstrapped(Ok(code)));
                    }
                    Err(RetryError::Cancelled) => {}
                    Err(err) => {
                        sink.report(SessionReport::Bootstrapped(Err(err.to_string())));
                    }
                }
            }
            .in_current_span(),
        );
    }

    fn start_manual_refresh(&mut self, tag: Generation) {
        let sink = self.start_timer(SessionTimer::ManualRefresh);
        let gateway = self.deps.gateway.clone();
        let session_id = self.session_id().clone();
        let retry = self.retry.clone();

        tokio::spawn(
            async move {
                let token = sink.token().clone();
                let gateway = gateway.as_ref();
                let id = &session_id;
                let result = match retry.run(&token, move |_| fetch_code(gateway, id)).await {
                    Ok(code) => Ok(code),
                    Err(RetryError::Cancelled) => return,
                    Err(err) => Err(err.to_string()),
                };
                sink.report(SessionReport::RefreshFetched {
                    tag,
                    source: RefreshSource::Manual,
                    result,
                });
            }
            .in_current_span(),
        );
    }

    fn session_id(&self) -> &SessionId {
        self.machine.session().session_id()
    }
}
