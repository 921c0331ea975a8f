//! Warden `AuthN`
//!
//! Implements the authentication stage on top of `authn-sdk`:
//!
//! - [`ProviderManager`] - routes credential requests to identity providers and runs the augmentor chain
//! - [`mechanism`] - built-in basic, bearer, form and mTLS mechanisms
//! - [`provider::StaticIdentityProvider`] - users and tokens from configuration
//! - [`augmentor::RolesMappingAugmentor`] - global role mapping
//! - [`AuthnStack`] - everything above, assembled from [`config::AuthnConfig`]
//!
//! ## Usage
//!
//! ```ignore
//! let stack = AuthnStack::from_config(&cfg)?
//!     .with_augmentor(Arc::new(MyAugmentor))
//!     .build();
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod augmentor;
pub mod config;
pub mod domain;
pub mod mechanism;
pub mod module;
pub mod provider;

// Re-export main types at crate root
pub use config::AuthnConfig;
pub use domain::ProviderManager;
pub use module::{AuthnStack, AuthnStackBuilder};
