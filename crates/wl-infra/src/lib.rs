//! # wl-infra
//!
//! Infrastructure adapters for the walink ports: the Evolution-style HTTP
//! gateway, webhook payload parsing and the JSON file session store.

pub mod gateway;
pub mod store;
pub mod webhook;

pub use gateway::{EvolutionConfig, EvolutionGateway};
pub use store::FileSessionStore;
pub use webhook::{parse_webhook, ConnectionUpdate, RemoteState, WebhookError};
