//! Addon provider contract, provider registry and the built-in providers.

pub mod error;
pub mod provider;
pub mod registry;
pub mod secret;

pub use error::*;
pub use provider::*;
pub use registry::*;
pub use secret::SecretProvider;
