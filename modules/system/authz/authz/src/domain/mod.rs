//! Domain layer for authorization.

pub mod authorization;
pub mod http_policy;

pub use authorization::AuthorizationEvaluator;
pub use http_policy::{HttpPermission, HttpPolicyEvaluator, PolicyFailure, PolicyOutcome};
