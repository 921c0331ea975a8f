#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Warden `AuthZ` SDK
//!
//! This crate provides the public contracts of the authorization stage:
//!
//! - [`HttpSecurityPolicy`] - named path policy deciding on a request
//! - [`IdentitySource`] - lazy access to the request identity from a policy
//! - [`CheckResult`] - permit/deny decision, optionally with an augmented identity
//! - [`SecurityCheck`], [`PermissionsAllowed`] - endpoint-level declarations
//! - [`PermissionChecker`] - application code deciding a named permission
//! - [`AuthZError`], [`CheckerError`] - error types
//!
//! ## Usage
//!
//! ```ignore
//! use authz_sdk::{CheckResult, HttpSecurityPolicy, IdentitySource};
//!
//! struct AdminHeaderPolicy;
//!
//! #[async_trait]
//! impl HttpSecurityPolicy for AdminHeaderPolicy {
//!     fn name(&self) -> &str { "admin-header" }
//!
//!     async fn check(&self, request: &RequestInfo, identity: &dyn IdentitySource)
//!         -> Result<CheckResult, AuthZError>
//!     {
//!         let identity = identity.identity().await?;
//!         Ok(if request.header("x-admin").is_some() {
//!             CheckResult::permit_with(SecurityIdentity::builder_from(&identity).role("admin").build())
//!         } else {
//!             CheckResult::deny()
//!         })
//!     }
//! }
//! ```

pub mod check;
pub mod checker;
pub mod error;
pub mod policy;
pub mod security_check;

// Re-export main types at crate root
pub use check::CheckResult;
pub use checker::PermissionChecker;
pub use error::{AuthZError, CheckerError};
pub use policy::{HttpSecurityPolicy, IdentitySource};
pub use security_check::{PermissionKind, PermissionsAllowed, SecuredMethod, SecurityCheck};
