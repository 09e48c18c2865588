//! Installing the enforcement middleware on a router.

use std::sync::Arc;

use axum::{middleware, Router};
use viewgate_core::{Enforcer, ViewGate};

use crate::middleware::enforce_view_permission;
use crate::state::GateState;

/// Installs per-handler permission checks on an axum router.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use axum::{routing::get, Router};
/// use viewgate_core::{HandlerRegistration, MemoryPermissionStore, StaticCatalog, ViewGate};
/// use viewgate_server::ViewGateLayer;
///
/// let catalog = StaticCatalog::builder()
///     .handler(
///         "billing",
///         HandlerRegistration::class("billing.views", "Invoice").route("/invoices/:id"),
///     )
///     .build()
///     .unwrap();
///
/// let gate = ViewGate::builder()
///     .catalog(Arc::new(catalog))
///     .store(Arc::new(MemoryPermissionStore::new()))
///     .build()
///     .unwrap();
///
/// let router: Router = Router::new().route("/invoices/:id", get(|| async { "invoice" }));
/// let app = ViewGateLayer::from_gate(&gate).protect(router);
/// # let _ = app;
/// ```
#[derive(Clone)]
pub struct ViewGateLayer {
    state: GateState,
}

impl ViewGateLayer {
    /// Create a layer around `enforcer`.
    pub fn new(enforcer: Enforcer) -> Self {
        Self::from_arc(Arc::new(enforcer))
    }

    /// Create a layer from a shared enforcer.
    pub fn from_arc(enforcer: Arc<Enforcer>) -> Self {
        Self {
            state: GateState::from_arc(enforcer),
        }
    }

    /// Create a layer from the enforcer of a configured gate.
    pub fn from_gate(gate: &ViewGate) -> Self {
        Self::new(gate.enforcer())
    }

    /// Protect every route currently on `router`.
    ///
    /// The check is installed as a route layer, so it only runs for
    /// requests that matched a route. Routes added afterwards are not
    /// protected.
    pub fn protect<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(
            self.state,
            enforce_view_permission,
        ))
    }
}

#[cfg(test)]
#[path = "layer_tests.rs"]
mod tests;
