//! Domain layer for authentication.

pub mod error;
pub mod manager;

pub use error::DomainError;
pub use manager::{ProviderManager, ProviderManagerBuilder};
