//! Well-known identity attribute keys and role markers.

/// Identity attribute holding the [`RequestId`](crate::RequestId) of the exchange
/// that produced the identity.
pub const REQUEST_ID_ATTRIBUTE: &str = "warden.request-id";

/// Identity attribute holding the name of the mechanism that authenticated the caller.
pub const AUTH_MECHANISM_ATTRIBUTE: &str = "warden.auth-mechanism";

/// Role placeholder that matches any authenticated identity in role policies.
pub const ANY_AUTHENTICATED_ROLE: &str = "**";

/// Separator between a permission name and its action (`read:all`).
pub const PERMISSION_TO_ACTION_SEPARATOR: char = ':';
