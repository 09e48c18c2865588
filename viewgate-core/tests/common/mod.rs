//! Shared fixtures for viewgate-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use viewgate_core::{ApplicationId, HandlerRegistration, StaticCatalog};

/// Two applications: `billing` with an invoice view and a health check,
/// and `blog` with a single index view.
pub fn sample_catalog() -> Arc<StaticCatalog> {
    Arc::new(
        StaticCatalog::builder()
            .handler(
                "billing",
                HandlerRegistration::class("billing.views", "Invoice").route("/invoices/:id"),
            )
            .handler(
                "billing",
                HandlerRegistration::function("billing.views", "health").route("/billing/health"),
            )
            .handler(
                "blog",
                HandlerRegistration::function("blog.views", "index").route("/blog"),
            )
            .build()
            .expect("sample catalog is valid"),
    )
}

pub fn billing() -> ApplicationId {
    ApplicationId::new("billing")
}

pub fn blog() -> ApplicationId {
    ApplicationId::new("blog")
}
