//! Handler catalog.
//!
//! The catalog is the registry of installed applications and the handlers
//! each one declares. It is populated once at startup, either through
//! [`StaticCatalog::builder`] or from a JSON manifest, and only read after
//! that.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::handler::{ApplicationId, HandlerIdentity, HandlerKind};

/// Errors raised while building or querying a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The identifier does not name a loaded application.
    #[error("Application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    /// Two handlers were mounted on the same route.
    #[error("Route '{route}' is claimed by both '{first}' and '{second}'")]
    DuplicateRoute {
        route: String,
        first: HandlerIdentity,
        second: HandlerIdentity,
    },

    /// One handler was declared by two applications.
    #[error("Handler '{handler}' is declared by both '{first}' and '{second}'")]
    HandlerInMultipleApplications {
        handler: HandlerIdentity,
        first: ApplicationId,
        second: ApplicationId,
    },

    /// The manifest is malformed.
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// IO error while reading a manifest.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing a manifest.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read access to the host's handler registry.
pub trait HandlerCatalog: Send + Sync {
    /// Applications in registry order.
    fn applications(&self) -> Vec<ApplicationId>;

    /// Handlers of one application, in declaration order.
    ///
    /// Fails with [`CatalogError::ApplicationNotFound`] for an unknown id.
    fn handlers(&self, application: &ApplicationId) -> Result<Vec<HandlerIdentity>, CatalogError>;

    /// Application that declares `handler`, if any.
    fn application_of(&self, handler: &HandlerIdentity) -> Option<ApplicationId>;

    /// Label-override token declared by `handler`, if any.
    fn label_token(&self, handler: &HandlerIdentity) -> Option<String>;

    /// Handler mounted on a matched route pattern.
    fn resolve(&self, route: &str) -> Option<HandlerIdentity>;
}

/// One handler as declared to a [`StaticCatalogBuilder`].
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    identity: HandlerIdentity,
    kind: HandlerKind,
    routes: Vec<String>,
    label_token: Option<String>,
}

impl HandlerRegistration {
    /// Declare a function handler.
    pub fn function(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity: HandlerIdentity::new(module, name),
            kind: HandlerKind::Function,
            routes: Vec::new(),
            label_token: None,
        }
    }

    /// Declare a class-based handler.
    pub fn class(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::Class,
            ..Self::function(module, name)
        }
    }

    /// Mount the handler on a route pattern.
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.routes.push(route.into());
        self
    }

    /// Declare a label-override token, translated at synthesis time.
    pub fn label(mut self, token: impl Into<String>) -> Self {
        self.label_token = Some(token.into());
        self
    }

    pub fn identity(&self) -> &HandlerIdentity {
        &self.identity
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
struct HandlerEntry {
    application: ApplicationId,
    kind: HandlerKind,
    label_token: Option<String>,
}

/// In-memory catalog populated once at startup.
///
/// # Example
///
/// ```rust
/// use viewgate_core::{ApplicationId, HandlerCatalog, HandlerRegistration, StaticCatalog};
///
/// let catalog = StaticCatalog::builder()
///     .handler(
///         "billing",
///         HandlerRegistration::class("billing.views", "Invoice").route("/invoices/:id"),
///     )
///     .build()
///     .unwrap();
///
/// let billing = ApplicationId::new("billing");
/// assert_eq!(catalog.handlers(&billing).unwrap().len(), 1);
/// assert_eq!(
///     catalog.resolve("/invoices/:id").unwrap().qualified_name(),
///     "billing.views.Invoice"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    applications: Vec<ApplicationId>,
    handlers: HashMap<ApplicationId, Vec<HandlerIdentity>>,
    entries: HashMap<HandlerIdentity, HandlerEntry>,
    routes: HashMap<String, HandlerIdentity>,
}

impl StaticCatalog {
    /// Start building a catalog.
    pub fn builder() -> StaticCatalogBuilder {
        StaticCatalogBuilder::default()
    }

    /// Build a catalog from a JSON manifest.
    ///
    /// ```json
    /// {"applications": [{"name": "billing", "handlers": [
    ///   {"module": "billing.views", "name": "Invoice", "kind": "class",
    ///    "routes": ["/invoices/:id"], "label": "billing.invoice"}]}]}
    /// ```
    pub fn from_manifest_json(json: &str) -> Result<Self, CatalogError> {
        let manifest: Manifest = serde_json::from_str(json)?;
        let mut builder = Self::builder();
        for app in manifest.applications {
            if app.name.trim().is_empty() {
                return Err(CatalogError::Manifest(
                    "application with an empty name".to_string(),
                ));
            }
            builder = builder.application(app.name.as_str());
            for entry in app.handlers {
                if entry.name.trim().is_empty() {
                    return Err(CatalogError::Manifest(format!(
                        "application '{}': handler in module '{}' has an empty name",
                        app.name, entry.module
                    )));
                }
                let mut registration = match entry.kind {
                    HandlerKind::Function => HandlerRegistration::function(entry.module, entry.name),
                    HandlerKind::Class => HandlerRegistration::class(entry.module, entry.name),
                };
                registration.routes = entry.routes;
                registration.label_token = entry.label;
                builder = builder.handler(app.name.as_str(), registration);
            }
        }
        builder.build()
    }

    /// Read and parse a JSON manifest file.
    pub async fn load_manifest_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_manifest_json(&content)
    }

    /// Kind of a registered handler.
    pub fn kind_of(&self, handler: &HandlerIdentity) -> Option<HandlerKind> {
        self.entries.get(handler).map(|entry| entry.kind)
    }

    /// Total number of distinct handlers across all applications.
    pub fn handler_count(&self) -> usize {
        self.entries.len()
    }
}

impl HandlerCatalog for StaticCatalog {
    fn applications(&self) -> Vec<ApplicationId> {
        self.applications.clone()
    }

    fn handlers(&self, application: &ApplicationId) -> Result<Vec<HandlerIdentity>, CatalogError> {
        self.handlers
            .get(application)
            .cloned()
            .ok_or_else(|| CatalogError::ApplicationNotFound(application.clone()))
    }

    fn application_of(&self, handler: &HandlerIdentity) -> Option<ApplicationId> {
        self.entries
            .get(handler)
            .map(|entry| entry.application.clone())
    }

    fn label_token(&self, handler: &HandlerIdentity) -> Option<String> {
        self.entries
            .get(handler)
            .and_then(|entry| entry.label_token.clone())
    }

    fn resolve(&self, route: &str) -> Option<HandlerIdentity> {
        self.routes.get(route).cloned()
    }
}

/// Builder for [`StaticCatalog`].
#[derive(Debug, Default)]
pub struct StaticCatalogBuilder {
    applications: Vec<ApplicationId>,
    registrations: Vec<(ApplicationId, HandlerRegistration)>,
}

impl StaticCatalogBuilder {
    /// Register an application, even one without handlers.
    pub fn application(mut self, application: impl Into<ApplicationId>) -> Self {
        let application = application.into();
        if !self.applications.contains(&application) {
            self.applications.push(application);
        }
        self
    }

    /// Declare a handler of `application`, registering the application if needed.
    pub fn handler(
        mut self,
        application: impl Into<ApplicationId>,
        registration: HandlerRegistration,
    ) -> Self {
        let application = application.into();
        self = self.application(application.clone());
        self.registrations.push((application, registration));
        self
    }

    /// Validate and freeze the catalog.
    ///
    /// A handler declared twice within one application is kept once, at its
    /// first position, with its routes merged.
    pub fn build(self) -> Result<StaticCatalog, CatalogError> {
        let mut catalog = StaticCatalog {
            applications: self.applications,
            ..StaticCatalog::default()
        };
        for application in &catalog.applications {
            catalog.handlers.insert(application.clone(), Vec::new());
        }

        for (application, registration) in self.registrations {
            let identity = registration.identity;

            match catalog.entries.get_mut(&identity) {
                Some(existing) if existing.application != application => {
                    return Err(CatalogError::HandlerInMultipleApplications {
                        handler: identity,
                        first: existing.application.clone(),
                        second: application,
                    });
                }
                Some(existing) => {
                    if existing.label_token.is_none() {
                        existing.label_token = registration.label_token;
                    }
                }
                None => {
                    catalog.entries.insert(
                        identity.clone(),
                        HandlerEntry {
                            application: application.clone(),
                            kind: registration.kind,
                            label_token: registration.label_token,
                        },
                    );
                    catalog
                        .handlers
                        .entry(application)
                        .or_default()
                        .push(identity.clone());
                }
            }

            for route in registration.routes {
                match catalog.routes.get(&route) {
                    Some(first) if *first != identity => {
                        return Err(CatalogError::DuplicateRoute {
                            route,
                            first: first.clone(),
                            second: identity,
                        });
                    }
                    Some(_) => {}
                    None => {
                        catalog.routes.insert(route, identity.clone());
                    }
                }
            }
        }

        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    applications: Vec<ManifestApplication>,
}

#[derive(Debug, Deserialize)]
struct ManifestApplication {
    name: String,
    #[serde(default)]
    handlers: Vec<ManifestHandler>,
}

#[derive(Debug, Deserialize)]
struct ManifestHandler {
    module: String,
    name: String,
    #[serde(default)]
    kind: HandlerKind,
    #[serde(default)]
    routes: Vec<String>,
    #[serde(default)]
    label: Option<String>,
}
