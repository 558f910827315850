//! ID type wrappers for type safety.

pub mod owner_id;
pub mod session_id;

pub use owner_id::OwnerId;
pub use session_id::SessionId;
