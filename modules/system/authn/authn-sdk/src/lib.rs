//! Warden `AuthN` SDK
//!
//! This crate provides the public contracts of the authentication stage:
//!
//! - [`IdentityProvider`] - turns a typed credential request into an identity
//! - [`IdentityProviderManager`] - routes credential requests to providers and runs augmentation
//! - [`IdentityAugmentor`] - post-authentication identity transforms
//! - [`HttpAuthenticationMechanism`] - extracts credentials from a request and produces challenges
//! - [`RequestInfo`] - transport-agnostic view of the inbound request
//! - [`AuthNError`] - error types
//!
//! ## Usage
//!
//! ```ignore
//! use authn_sdk::{HttpAuthenticationMechanism, IdentityProviderManager};
//!
//! let identity = mechanism.authenticate(&request, &*providers).await?;
//! let challenge = mechanism.challenge(&request);
//! ```

pub mod augmentor;
pub mod error;
pub mod mechanism;
pub mod provider;
pub mod request;

// Re-export main types at crate root
pub use augmentor::IdentityAugmentor;
pub use error::AuthNError;
pub use mechanism::{ChallengeData, HttpAuthenticationMechanism};
pub use provider::{IdentityProvider, IdentityProviderManager};
pub use request::RequestInfo;
