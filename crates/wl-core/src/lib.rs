//! # wl-core
//!
//! Core domain models and business logic for walink.
//!
//! This crate contains the pairing session entity, its pure state machine and
//! the ports the application layer drives, without any infrastructure
//! dependencies.

pub mod config;
pub mod ids;
pub mod pairing;
pub mod ports;
pub mod settings;

// Re-export commonly used types at the crate root
pub use config::AppConfig;
pub use ids::{OwnerId, SessionId};
pub use pairing::{
    Generation, PairingCode, PairingSession, SessionNotice, SessionState, SessionUpdate,
};
pub use settings::PairingSettings;
