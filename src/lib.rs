//! walink library
//!
//! Process-level pieces of the `walink` binary: bootstrap, CLI commands and
//! the webhook receiver.

pub mod bootstrap;
pub mod commands;
pub mod webhook_server;
