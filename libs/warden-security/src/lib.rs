#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Warden security primitives.
//!
//! - [`SecurityIdentity`] - immutable caller representation shared by every stage
//! - [`Permission`] - required/possessed capability model
//! - [`AuthenticationRequest`] - typed credential bundles consumed by identity providers
//! - [`execution`] - worker/event-loop affinity marker observed by permission checkers

pub mod constants;
pub mod credentials;
pub mod execution;
pub mod identity;
pub mod permission;

pub use credentials::{
    AuthenticationRequest, CertificateRequest, RequestType, TokenRequest, TrustedPrincipalRequest,
    UsernamePasswordRequest,
};
pub use execution::{ExecutionAffinity, WorkerError};
pub use identity::{PermissionCheckerFn, RequestId, SecurityIdentity, SecurityIdentityBuilder};
pub use permission::{CustomPermission, Permission, PermissionParseError, StringPermission};
