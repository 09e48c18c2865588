//! Request-time enforcement of per-handler permissions.
//!
//! Each request resolved to a handler is evaluated in this order:
//!
//! 1. Ignored handler: allow, [`DecisionReason::NoPermissionDefined`].
//! 2. Owning application has no records and is not forced into enforcement:
//!    allow, [`DecisionReason::ApplicationNotEnforced`].
//! 3. No record for the handler's key: allow, [`DecisionReason::NoPermissionDefined`].
//! 4. Principal holds the key: allow, [`DecisionReason::PermissionHeld`].
//! 5. Otherwise: deny, [`DecisionReason::PermissionMissing`].
//!
//! Requests that resolve to no handler are not evaluated at all.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::catalog::HandlerCatalog;
use crate::handler::{ApplicationId, HandlerIdentity, Principal};
use crate::ignore::IgnoreFilter;
use crate::store::{PermissionStore, PermissionStoreError};
use crate::synth::{PermissionKey, Synthesizer};

/// Why a request was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// The handler is ignored, or no record exists for its key.
    NoPermissionDefined,
    /// The principal holds the handler's permission.
    PermissionHeld,
    /// The handler has a permission the principal does not hold.
    PermissionMissing,
    /// The owning application has no records at all.
    ApplicationNotEnforced,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionReason::NoPermissionDefined => write!(f, "no_permission_defined"),
            DecisionReason::PermissionHeld => write!(f, "permission_held"),
            DecisionReason::PermissionMissing => write!(f, "permission_missing"),
            DecisionReason::ApplicationNotEnforced => write!(f, "application_not_enforced"),
        }
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementDecision {
    pub allow: bool,
    pub reason: DecisionReason,
    /// The handler the request resolved to.
    pub handler: HandlerIdentity,
    /// The key that was checked, when the evaluation got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PermissionKey>,
}

impl EnforcementDecision {
    fn allow(reason: DecisionReason, handler: &HandlerIdentity, key: Option<PermissionKey>) -> Self {
        Self {
            allow: true,
            reason,
            handler: handler.clone(),
            key,
        }
    }

    fn deny(handler: &HandlerIdentity, key: PermissionKey) -> Self {
        Self {
            allow: false,
            reason: DecisionReason::PermissionMissing,
            handler: handler.clone(),
            key: Some(key),
        }
    }

    /// Returns true if the request may proceed.
    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    /// Returns true if the request must be rejected.
    pub fn is_denied(&self) -> bool {
        !self.allow
    }
}

/// Errors raised while evaluating a request.
#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    /// The permission store could not answer.
    #[error("Permission store unavailable: {0}")]
    StoreUnavailable(#[from] PermissionStoreError),
}

/// Decides whether a principal may reach a handler.
pub struct Enforcer {
    catalog: Arc<dyn HandlerCatalog>,
    store: Arc<dyn PermissionStore>,
    synthesizer: Synthesizer,
    ignore: Arc<IgnoreFilter>,
    enforced: HashSet<ApplicationId>,
}

impl Enforcer {
    pub fn new(
        catalog: Arc<dyn HandlerCatalog>,
        store: Arc<dyn PermissionStore>,
        synthesizer: Synthesizer,
        ignore: Arc<IgnoreFilter>,
    ) -> Self {
        Self {
            catalog,
            store,
            synthesizer,
            ignore,
            enforced: HashSet::new(),
        }
    }

    /// Enforce these applications even before any of their records exist.
    ///
    /// Handlers of a listed application without a record are still allowed
    /// with [`DecisionReason::NoPermissionDefined`].
    pub fn with_enforced_applications<I, A>(mut self, applications: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ApplicationId>,
    {
        self.enforced = applications.into_iter().map(Into::into).collect();
        self
    }

    /// Evaluate a request by its route.
    ///
    /// Returns `Ok(None)` when the route does not resolve to a handler, in
    /// which case nothing is enforced. Store failures are returned to the
    /// caller; see [`decide`](Self::decide) for the fail-closed variant.
    pub async fn evaluate(
        &self,
        principal: Option<&Principal>,
        route: &str,
    ) -> Result<Option<EnforcementDecision>, EnforcementError> {
        match self.resolve(route) {
            Some(handler) => Ok(Some(self.evaluate_handler(principal, &handler).await?)),
            None => Ok(None),
        }
    }

    /// Evaluate a request already resolved to `handler`.
    pub async fn evaluate_handler(
        &self,
        principal: Option<&Principal>,
        handler: &HandlerIdentity,
    ) -> Result<EnforcementDecision, EnforcementError> {
        if self.ignore.is_ignored(handler) {
            debug!(handler = %handler, "Handler ignored, not enforcing");
            return Ok(EnforcementDecision::allow(
                DecisionReason::NoPermissionDefined,
                handler,
                None,
            ));
        }

        let Some(application) = self.catalog.application_of(handler) else {
            debug!(handler = %handler, "Handler has no owning application");
            return Ok(EnforcementDecision::allow(
                DecisionReason::ApplicationNotEnforced,
                handler,
                None,
            ));
        };

        if !self.enforced.contains(&application) && !self.store.has_permissions(&application).await?
        {
            debug!(
                application = %application,
                handler = %handler,
                "Application has no permissions, not enforcing"
            );
            return Ok(EnforcementDecision::allow(
                DecisionReason::ApplicationNotEnforced,
                handler,
                None,
            ));
        }

        let key = self.synthesizer.key(handler);
        let defined = self
            .store
            .get_permission(&key)
            .await?
            .is_some_and(|record| record.application == application);
        if !defined {
            debug!(handler = %handler, key = %key, "No permission defined for handler");
            return Ok(EnforcementDecision::allow(
                DecisionReason::NoPermissionDefined,
                handler,
                Some(key),
            ));
        }

        let held = match principal {
            Some(principal) => self.store.has_grant(principal, &key).await?,
            None => false,
        };

        if held {
            Ok(EnforcementDecision::allow(
                DecisionReason::PermissionHeld,
                handler,
                Some(key),
            ))
        } else {
            debug!(
                principal = principal.map(Principal::as_str).unwrap_or("<anonymous>"),
                handler = %handler,
                key = %key,
                "Access denied, permission missing"
            );
            Ok(EnforcementDecision::deny(handler, key))
        }
    }

    /// Evaluate a request, denying it if the store fails.
    pub async fn decide(
        &self,
        principal: Option<&Principal>,
        route: &str,
    ) -> Option<EnforcementDecision> {
        let handler = self.resolve(route)?;
        match self.evaluate_handler(principal, &handler).await {
            Ok(decision) => Some(decision),
            Err(err) => {
                error!(
                    handler = %handler,
                    error = %err,
                    "Permission check failed, denying request"
                );
                let key = self.synthesizer.key(&handler);
                Some(EnforcementDecision::deny(&handler, key))
            }
        }
    }

    fn resolve(&self, route: &str) -> Option<HandlerIdentity> {
        let handler = self.catalog.resolve(route);
        if handler.is_none() {
            warn!(route = %route, "Route not resolved to a handler, not enforcing");
        }
        handler
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("synthesizer", &self.synthesizer)
            .field("ignore", &self.ignore)
            .field("enforced", &self.enforced)
            .finish_non_exhaustive()
    }
}
