//! Wiring of configuration, catalog and store into the two entry points.

use std::sync::Arc;

use crate::catalog::HandlerCatalog;
use crate::config::ViewGateConfig;
use crate::enforce::Enforcer;
use crate::error::{Error, Result};
use crate::handler::ApplicationId;
use crate::ignore::IgnoreFilter;
use crate::reconcile::Reconciler;
use crate::store::PermissionStore;
use crate::synth::Synthesizer;
use crate::translate::{MessageCatalog, NoTranslation, Translator};

/// Shared configuration plus collaborators.
///
/// Both the [`Reconciler`] and the [`Enforcer`] built from one `ViewGate`
/// see the same prefix, ignore list and translator.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use viewgate_core::{
///     HandlerRegistration, MemoryPermissionStore, StaticCatalog, ViewGate, ViewGateConfig,
/// };
///
/// let catalog = StaticCatalog::builder()
///     .handler("shop", HandlerRegistration::function("shop.views", "cart").route("/cart"))
///     .build()
///     .unwrap();
///
/// let gate = ViewGate::builder()
///     .config(ViewGateConfig::default())
///     .catalog(Arc::new(catalog))
///     .store(Arc::new(MemoryPermissionStore::new()))
///     .build()
///     .unwrap();
///
/// let reconciler = gate.reconciler();
/// let enforcer = gate.enforcer();
/// # let _ = (reconciler, enforcer);
/// ```
#[derive(Clone)]
pub struct ViewGate {
    config: Arc<ViewGateConfig>,
    catalog: Arc<dyn HandlerCatalog>,
    store: Arc<dyn PermissionStore>,
    synthesizer: Synthesizer,
    ignore: Arc<IgnoreFilter>,
}

impl ViewGate {
    pub fn builder() -> ViewGateBuilder {
        ViewGateBuilder::default()
    }

    pub fn config(&self) -> &ViewGateConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn HandlerCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Applications a reconciliation run targets by default.
    ///
    /// The configured list if one is set, otherwise every application in
    /// the catalog.
    pub fn target_applications(&self) -> Vec<ApplicationId> {
        if self.config.applications.is_empty() {
            self.catalog.applications()
        } else {
            self.config.applications.clone()
        }
    }

    /// A reconciler over this gate's catalog and store.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.catalog.clone(),
            self.store.clone(),
            self.synthesizer.clone(),
            self.ignore.clone(),
        )
    }

    /// An enforcer over this gate's catalog and store.
    pub fn enforcer(&self) -> Enforcer {
        Enforcer::new(
            self.catalog.clone(),
            self.store.clone(),
            self.synthesizer.clone(),
            self.ignore.clone(),
        )
        .with_enforced_applications(self.config.enforced_applications.iter().cloned())
    }
}

impl std::fmt::Debug for ViewGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ViewGate`].
#[derive(Default)]
pub struct ViewGateBuilder {
    config: Option<ViewGateConfig>,
    catalog: Option<Arc<dyn HandlerCatalog>>,
    store: Option<Arc<dyn PermissionStore>>,
    translator: Option<Arc<dyn Translator>>,
    messages: Option<MessageCatalog>,
}

impl ViewGateBuilder {
    /// Use `config` instead of [`ViewGateConfig::default`].
    pub fn config(mut self, config: ViewGateConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn HandlerCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(mut self, store: Arc<dyn PermissionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Translate label overrides with `translator`.
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Translate label overrides with a message catalog.
    ///
    /// The active locale is taken from the configured language, if any, when
    /// the gate is built.
    pub fn messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Validate the configuration and assemble the gate.
    pub fn build(self) -> Result<ViewGate> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let catalog = self
            .catalog
            .ok_or_else(|| Error::Config("a handler catalog is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| Error::Config("a permission store is required".to_string()))?;

        let translator: Arc<dyn Translator> = match (self.translator, self.messages) {
            (Some(translator), _) => translator,
            (None, Some(mut messages)) => {
                if let Some(language) = &config.language {
                    messages.set_locale(language.clone());
                }
                Arc::new(messages)
            }
            (None, None) => Arc::new(NoTranslation),
        };
        let synthesizer = Synthesizer::new(config.prefix.clone()).with_translator(translator);
        let ignore = Arc::new(config.ignore_filter());

        Ok(ViewGate {
            config: Arc::new(config),
            catalog,
            store,
            synthesizer,
            ignore,
        })
    }
}
