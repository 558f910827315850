//! Port interfaces for the application layer
//!
//! Ports define the contract between the pairing controller and the
//! infrastructure implementations, keeping the state machine independent of
//! the gateway's wire format and of the storage medium.

pub mod errors;
pub mod gateway;
pub mod session_store;

pub use errors::{GatewayError, SessionStoreError};
pub use gateway::{ConnectionStatus, GatewayPort};
pub use session_store::{SessionRecord, SessionStorePort};
