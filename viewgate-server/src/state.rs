//! Shared state for the enforcement middleware.

use std::sync::Arc;

use viewgate_core::Enforcer;

/// State cloned into every middleware invocation.
#[derive(Clone)]
pub struct GateState {
    /// The shared enforcer.
    pub enforcer: Arc<Enforcer>,
}

impl GateState {
    /// Create state from an `Arc<Enforcer>`.
    pub fn from_arc(enforcer: Arc<Enforcer>) -> Self {
        Self { enforcer }
    }
}
