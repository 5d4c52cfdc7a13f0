pub mod addon;
pub mod config;
pub mod state;

pub use addon::*;
pub use config::*;
pub use state::*;
