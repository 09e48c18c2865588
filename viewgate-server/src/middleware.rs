//! The enforcement interceptor as an axum middleware function.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use viewgate_core::Principal;

use crate::error::ServerError;
use crate::state::GateState;

/// Check the matched route's permission before the handler runs.
///
/// The principal is read from the request extensions, where upstream
/// authentication puts it; a request without one is anonymous. Allowed
/// requests carry their [`EnforcementDecision`](viewgate_core::EnforcementDecision)
/// in the extensions for downstream handlers.
pub async fn enforce_view_permission(
    State(state): State<GateState>,
    matched: Option<MatchedPath>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(matched) = matched else {
        return Ok(next.run(request).await);
    };

    let principal = request.extensions().get::<Principal>().cloned();
    let decision = state
        .enforcer
        .decide(principal.as_ref(), matched.as_str())
        .await;

    match decision {
        Some(decision) if decision.is_denied() => Err(ServerError::denied(&decision)),
        Some(decision) => {
            request.extensions_mut().insert(decision);
            Ok(next.run(request).await)
        }
        None => Ok(next.run(request).await),
    }
}
