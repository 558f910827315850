//! Pairing session domain: entity, observable updates and the pure state machine.

pub mod session;
pub mod state_machine;

pub use session::{
    Generation, PairingCode, PairingSession, RenderHint, SessionNotice, SessionState,
    SessionUpdate,
};
pub use state_machine::{
    PairingAction, PairingEvent, PairingPolicy, PairingStateMachine, RefreshSource, SessionTimer,
};
