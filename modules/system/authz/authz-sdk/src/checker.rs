//! Permission checker contract.

use async_trait::async_trait;
use serde_json::Value;
use warden_security::{ExecutionAffinity, SecurityIdentity};

use crate::error::CheckerError;

/// Application code deciding one named permission.
///
/// A [`PermissionsAllowed`](crate::PermissionsAllowed) value equal to
/// [`PermissionChecker::permission`] is decided by this checker instead of the
/// identity's possessed permissions.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Permission name this checker decides.
    fn permission(&self) -> &str;

    /// Execution context the checker must run on.
    fn affinity(&self) -> ExecutionAffinity {
        ExecutionAffinity::NonBlocking
    }

    /// Decide the permission for `identity` given the call arguments.
    ///
    /// # Errors
    ///
    /// Any error fails the request; it is never treated as a denial.
    async fn check(&self, identity: &SecurityIdentity, args: &Value) -> Result<bool, CheckerError>;
}
