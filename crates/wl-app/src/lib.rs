//! # wl-app
//!
//! Application layer for walink: drives the pure pairing state machine from
//! `wl-core` with real timers and gateway calls.

pub mod usecases;

pub use usecases::pairing::{
    PairingController, PairingDeps, PairingError, PairingRegistry, PairingSessionHandle,
    RetryError, RetryPolicy, SessionObserver,
};
