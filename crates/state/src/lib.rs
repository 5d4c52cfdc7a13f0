//! Durable addon records and the lifecycle state machine that guards them.

pub mod error;
pub mod manager;
pub mod sqlite_store;
pub mod store;

pub use error::*;
pub use manager::*;
pub use sqlite_store::*;
pub use store::*;
