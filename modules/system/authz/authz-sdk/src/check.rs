//! Authorization decisions.

use warden_security::SecurityIdentity;

/// Decision of an HTTP security policy.
///
/// A permit may carry an augmented identity, which replaces the request
/// identity for every later stage of the same request.
#[derive(Debug, Clone)]
pub struct CheckResult {
    permitted: bool,
    augmented_identity: Option<SecurityIdentity>,
}

impl CheckResult {
    #[must_use]
    pub fn permit() -> Self {
        Self {
            permitted: true,
            augmented_identity: None,
        }
    }

    #[must_use]
    pub fn deny() -> Self {
        Self {
            permitted: false,
            augmented_identity: None,
        }
    }

    /// Permit and replace the request identity.
    #[must_use]
    pub fn permit_with(identity: SecurityIdentity) -> Self {
        Self {
            permitted: true,
            augmented_identity: Some(identity),
        }
    }

    #[must_use]
    pub fn is_permitted(&self) -> bool {
        self.permitted
    }

    #[must_use]
    pub fn augmented_identity(&self) -> Option<&SecurityIdentity> {
        self.augmented_identity.as_ref()
    }

    #[must_use]
    pub fn into_augmented_identity(self) -> Option<SecurityIdentity> {
        self.augmented_identity
    }
}
