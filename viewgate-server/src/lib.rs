//! axum middleware for viewgate per-handler permissions.
//!
//! [`ViewGateLayer`] wraps a router so that every matched request is checked
//! by a [`viewgate_core::Enforcer`] before its handler runs. Denied requests
//! get a `403` with a JSON body; allowed ones carry the
//! [`EnforcementDecision`](viewgate_core::EnforcementDecision) in their
//! extensions.
//!
//! The caller's identity comes from a [`viewgate_core::Principal`] request
//! extension. Install your authentication layer outside the protected
//! router so it runs first.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use viewgate_core::{FilePermissionStore, StaticCatalog, ViewGate};
//! use viewgate_server::ViewGateLayer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = StaticCatalog::load_manifest_file("handlers.json").await?;
//! let gate = ViewGate::builder()
//!     .catalog(Arc::new(catalog))
//!     .store(Arc::new(FilePermissionStore::new(".viewgate/permissions.json")))
//!     .build()?;
//!
//! let router = Router::new().route("/invoices/:id", get(|| async { "invoice" }));
//! let app = ViewGateLayer::from_gate(&gate).protect(router);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod layer;
pub mod middleware;
pub mod state;

pub use error::ServerError;
pub use layer::ViewGateLayer;
pub use middleware::enforce_view_permission;
pub use state::GateState;
