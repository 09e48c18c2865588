//! # Viewgate
//!
//! Per-handler access permissions for request-routing applications.
//!
//! Every handler (view) an application declares gets one permission record,
//! keyed by a configurable prefix plus the handler's qualified name. An
//! out-of-band reconciliation run keeps those records aligned with the
//! handler registry, and a request-time check denies a principal who lacks
//! the permission of the handler serving their request.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use viewgate_core::{
//!     ApplicationId, DecisionReason, HandlerRegistration, MemoryPermissionStore, Principal,
//!     ReconcileOptions, StaticCatalog, ViewGate, ViewGateConfig,
//! };
//!
//! # tokio_test::block_on(async {
//! let catalog = StaticCatalog::builder()
//!     .handler(
//!         "billing",
//!         HandlerRegistration::class("billing.views", "Invoice").route("/invoices/:id"),
//!     )
//!     .build()
//!     .unwrap();
//! let store = Arc::new(MemoryPermissionStore::new());
//!
//! let gate = ViewGate::builder()
//!     .config(ViewGateConfig::default())
//!     .catalog(Arc::new(catalog))
//!     .store(store.clone())
//!     .build()
//!     .unwrap();
//!
//! // Create the records
//! let report = gate.reconciler().reconcile_all(ReconcileOptions::default()).await;
//! assert!(report.is_success());
//!
//! // Nobody holds the permission yet
//! let alice = Principal::new("alice");
//! let enforcer = gate.enforcer();
//! let decision = enforcer.decide(Some(&alice), "/invoices/:id").await.unwrap();
//! assert!(decision.is_denied());
//!
//! store.grant(&alice, &"access_view_billing.views.Invoice".into());
//! let decision = enforcer.decide(Some(&alice), "/invoices/:id").await.unwrap();
//! assert_eq!(decision.reason, DecisionReason::PermissionHeld);
//! # });
//! ```
//!
//! ## Reconciliation
//!
//! A [`Reconciler`] runs in one of four [`ReconcileMode`]s. Changes for one
//! application are computed as a [`ChangeSet`] and applied by the store as a
//! single unit. Failures are collected per application in the
//! [`ReconcileReport`]; one failing application never stops the others.
//!
//! ## Enforcement
//!
//! An [`Enforcer`] evaluates a request in a fixed order and returns an
//! [`EnforcementDecision`] with a [`DecisionReason`]. Applications that own
//! no records are not enforced at all, so installing the check is safe
//! before the first reconciliation. Store failures deny the request.
//!
//! ## Storage
//!
//! - [`MemoryPermissionStore`]: in-memory, for tests and ephemeral hosts
//! - [`FilePermissionStore`]: a single JSON file
//!
//! Implement [`PermissionStore`] for anything else.

pub mod catalog;
pub mod config;
pub mod enforce;
pub mod error;
pub mod gate;
pub mod handler;
pub mod ignore;
pub mod reconcile;
pub mod store;
pub mod synth;
pub mod translate;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use catalog::{CatalogError, HandlerCatalog, HandlerRegistration, StaticCatalog};
pub use config::{load_config_file, ConfigError, ViewGateConfig};
pub use enforce::{DecisionReason, EnforcementDecision, EnforcementError, Enforcer};
pub use error::{Error, Result};
pub use gate::{ViewGate, ViewGateBuilder};
pub use handler::{ApplicationId, HandlerIdentity, HandlerKind, Principal};
pub use ignore::IgnoreFilter;
pub use reconcile::{
    ApplicationFailure, ApplicationReport, ReconcileError, ReconcileMode, ReconcileOptions,
    ReconcilePlan, ReconcileReport, Reconciler,
};
pub use store::{
    ApplyOutcome, ChangeSet, FilePermissionStore, MemoryPermissionStore, PermissionRecord,
    PermissionStore, PermissionStoreError,
};
pub use synth::{PermissionKey, SynthesizedPermission, Synthesizer, DEFAULT_PREFIX};
pub use translate::{MessageCatalog, NoTranslation, Translator};
