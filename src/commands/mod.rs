//! CLI commands.

pub mod pair;
pub mod unpair;

pub use pair::run_pair;
pub use unpair::run_unpair;
