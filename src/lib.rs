/// Implemented RL algorithms
pub mod algo;

/// Agent interface
pub mod agent;

/// Environment contract
pub mod env;

/// Exploration policies
pub mod exploration;

/// Testbed environments
pub mod gym;

mod util;

pub use agent::EpisodicAgent;
pub use util::random_argmax;
