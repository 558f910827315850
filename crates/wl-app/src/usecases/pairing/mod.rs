//! QR pairing use cases
//!
//! One [`PairingController`] actor per session, composed of small background
//! tasks (refresh scheduler, status poller, timeout guard, welcome
//! dispatcher) that only ever report back through the controller mailbox.

mod controller;
mod errors;
mod mailbox;
mod observer;
mod refresh_scheduler;
mod registry;
mod retry;
mod status_poller;
mod timeout_guard;
mod welcome;

#[cfg(test)]
mod test_support;

pub use controller::{PairingController, PairingDeps, PairingSessionHandle, PendingCreation};
pub use errors::PairingError;
pub use observer::SessionObserver;
pub use registry::PairingRegistry;
pub use retry::{RetryError, RetryPolicy};
pub use welcome::DEFAULT_WELCOME_TEXT;
