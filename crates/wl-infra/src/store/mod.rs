pub mod file_session_store;

pub use file_session_store::{FileSessionStore, DEFAULT_SESSION_STORE_FILE};
