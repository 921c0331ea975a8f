//! Warden `AuthZ`
//!
//! Implements the authorization stage on top of `authz-sdk`:
//!
//! - [`HttpPolicyEvaluator`] - ordered path permissions mapped to policies
//! - [`AuthorizationEvaluator`] - role and permission checks of endpoints, permission checker dispatch
//! - [`path_matcher`] - exact, prefix and single-segment wildcard path patterns
//! - [`binding`] - argument binding for custom permissions
//! - [`policies`] - built-in `permit`, `deny`, `authenticated` and role policies
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod binding;
pub mod config;
pub mod domain;
pub mod path_matcher;
pub mod policies;

// Re-export main types at crate root
pub use config::{AppliesTo, HttpPermissionConfig, RolePolicyConfig};
pub use domain::{AuthorizationEvaluator, HttpPolicyEvaluator, PolicyFailure, PolicyOutcome};
pub use path_matcher::PathPattern;
