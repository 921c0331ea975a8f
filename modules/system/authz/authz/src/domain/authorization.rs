//! Endpoint-level authorization.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use authz_sdk::{AuthZError, CheckerError, PermissionChecker, PermissionKind, PermissionsAllowed, SecurityCheck};
use serde_json::Value;
use warden_security::constants::ANY_AUTHENTICATED_ROLE;
use warden_security::{CustomPermission, Permission, SecurityIdentity, StringPermission, execution};

use crate::binding;

/// Evaluates [`SecurityCheck`]s against an identity.
///
/// Holds the permission checker registry; read-only after construction.
pub struct AuthorizationEvaluator {
    checkers: HashMap<String, Arc<dyn PermissionChecker>>,
    blocking_checkers: bool,
}

impl AuthorizationEvaluator {
    /// `blocking_checkers` tells whether blocking-capable workers are available
    /// to checkers that require them.
    #[must_use]
    pub fn new(blocking_checkers: bool) -> Self {
        Self {
            checkers: HashMap::new(),
            blocking_checkers,
        }
    }

    /// Register a checker under its permission name.
    ///
    /// # Errors
    ///
    /// Fails when a checker is already registered for the name.
    pub fn register(&mut self, checker: Arc<dyn PermissionChecker>) -> anyhow::Result<()> {
        let name = checker.permission().to_owned();
        if self.checkers.contains_key(&name) {
            bail!("permission checker '{name}' is already registered");
        }
        self.checkers.insert(name, checker);
        Ok(())
    }

    /// Validate a declaration at registration time.
    ///
    /// # Errors
    ///
    /// Rejects empty declarations and malformed permission values.
    pub fn validate(&self, check: &SecurityCheck) -> anyhow::Result<()> {
        let SecurityCheck::Permissions(declarations) = check else {
            return Ok(());
        };
        if declarations.is_empty() {
            bail!("permissions check declares no permissions");
        }
        for declaration in declarations {
            if declaration.values.is_empty() {
                bail!("permissions declaration has no values");
            }
            for value in &declaration.values {
                if !self.checkers.contains_key(value) {
                    StringPermission::parse(value)?;
                }
            }
        }
        Ok(())
    }

    /// Authorize `identity` for `check`; `args` are the call arguments.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the check fails for the anonymous identity
    /// - `Forbidden` if it fails for an authenticated identity
    /// - `Checker` if a permission checker fails
    /// - `Misconfigured` if a permission value cannot be parsed
    pub async fn authorize(
        &self,
        identity: &SecurityIdentity,
        check: &SecurityCheck,
        args: &Value,
    ) -> Result<(), AuthZError> {
        let permitted = match check {
            SecurityCheck::PermitAll => return Ok(()),
            SecurityCheck::DenyAll => false,
            SecurityCheck::Authenticated => !identity.is_anonymous(),
            SecurityCheck::RolesAllowed(roles) => roles.iter().any(|role| {
                if role == ANY_AUTHENTICATED_ROLE {
                    !identity.is_anonymous()
                } else {
                    identity.has_role(role)
                }
            }),
            SecurityCheck::Permissions(declarations) => {
                let mut all = true;
                for declaration in declarations {
                    if !self.declaration_permits(identity, declaration, args).await? {
                        all = false;
                        break;
                    }
                }
                all
            }
        };
        if permitted {
            return Ok(());
        }
        if identity.is_anonymous() {
            return Err(AuthZError::Unauthenticated);
        }
        Err(AuthZError::forbidden(format!(
            "'{}' lacks the rights required by {check:?}",
            identity.principal_name()
        )))
    }

    async fn declaration_permits(
        &self,
        identity: &SecurityIdentity,
        declaration: &PermissionsAllowed,
        args: &Value,
    ) -> Result<bool, AuthZError> {
        for value in &declaration.values {
            let permits = self.value_permits(identity, declaration, value, args).await?;
            if permits != declaration.inclusive {
                // Short-circuit: first grant of an any-of, first refusal of an all-of.
                return Ok(permits);
            }
        }
        Ok(declaration.inclusive)
    }

    async fn value_permits(
        &self,
        identity: &SecurityIdentity,
        declaration: &PermissionsAllowed,
        value: &str,
        args: &Value,
    ) -> Result<bool, AuthZError> {
        if let Some(checker) = self.checkers.get(value) {
            return self.run_checker(checker, identity, args).await;
        }
        let parsed = StringPermission::parse(value).map_err(|e| AuthZError::Misconfigured(e.to_string()))?;
        let required = match &declaration.kind {
            PermissionKind::String => Permission::Named(parsed),
            PermissionKind::Custom { type_name } => {
                let permission = CustomPermission::new(type_name.clone(), parsed.name())
                    .with_actions(parsed.actions().iter().cloned());
                let permission = binding::bind(args, &declaration.params)
                    .into_iter()
                    .fold(permission, |p, (name, value)| p.with_param(name, value));
                Permission::Custom(permission)
            }
        };
        let granted = identity.implies(&required);
        if !granted {
            tracing::debug!(principal = %identity.principal_name(), permission = %required, "permission not granted");
        }
        Ok(granted)
    }

    async fn run_checker(
        &self,
        checker: &Arc<dyn PermissionChecker>,
        identity: &SecurityIdentity,
        args: &Value,
    ) -> Result<bool, AuthZError> {
        let name = checker.permission().to_owned();
        let affinity = checker.affinity();
        let failed = |source: CheckerError| AuthZError::Checker {
            checker: name.clone(),
            source,
        };
        if affinity.allows_blocking() && !self.blocking_checkers {
            return Err(failed(CheckerError::BlockingUnavailable));
        }
        let checker = Arc::clone(checker);
        let identity = identity.clone();
        let args = args.clone();
        let outcome = execution::run_on(affinity, move || async move {
            checker.check(&identity, &args).await
        })
        .await
        .map_err(|e| failed(e.into()))?;
        outcome.map_err(failed)
    }
}

impl Default for AuthorizationEvaluator {
    fn default() -> Self {
        Self::new(true)
    }
}
