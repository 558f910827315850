pub mod dto;
pub mod evolution;

pub use evolution::{EvolutionConfig, EvolutionGateway};
