//! Built-in identity providers.

pub mod static_provider;

pub use static_provider::{StaticIdentityProvider, StaticIdentityStore};
