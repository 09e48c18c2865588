//! Reconciliation of permission records against the handler catalog.
//!
//! Reconciliation runs out-of-band, one application at a time. For each
//! application it computes a [`ChangeSet`] from the catalog and the
//! application's current records, then hands it to the store to apply as a
//! single unit.
//!
//! | Mode | Effect |
//! |------|--------|
//! | [`ReconcileMode::Create`] | create records for handlers that lack one |
//! | [`ReconcileMode::PruneOrphaned`] | delete records whose handler is gone or ignored |
//! | [`ReconcileMode::RemoveAll`] | delete every record the application owns |
//! | [`ReconcileMode::CreateAndPrune`] | create, then prune (the default) |

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogError, HandlerCatalog};
use crate::handler::{ApplicationId, HandlerIdentity};
use crate::ignore::IgnoreFilter;
use crate::store::{ChangeSet, PermissionRecord, PermissionStore, PermissionStoreError};
use crate::synth::{PermissionKey, Synthesizer};

/// What a reconciliation run does to an application's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Create missing records, leave existing ones untouched.
    Create,
    /// Delete records with no live, non-ignored handler.
    PruneOrphaned,
    /// Delete every record owned by the application.
    RemoveAll,
    /// Create, then prune, in one pass.
    #[default]
    CreateAndPrune,
}

impl ReconcileMode {
    fn creates(self) -> bool {
        matches!(self, Self::Create | Self::CreateAndPrune)
    }

    fn prunes(self) -> bool {
        matches!(self, Self::PruneOrphaned | Self::CreateAndPrune)
    }
}

impl std::fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileMode::Create => write!(f, "create"),
            ReconcileMode::PruneOrphaned => write!(f, "prune-orphaned"),
            ReconcileMode::RemoveAll => write!(f, "remove-all"),
            ReconcileMode::CreateAndPrune => write!(f, "create-and-prune"),
        }
    }
}

/// Options for a reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub mode: ReconcileMode,

    /// Rewrite labels of existing records whose synthesized label changed
    /// (e.g. after a translation update). Only applies when creating.
    pub refresh_labels: bool,
}

impl ReconcileOptions {
    pub fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            refresh_labels: false,
        }
    }

    pub fn with_refresh_labels(mut self, refresh: bool) -> Self {
        self.refresh_labels = refresh;
        self
    }
}

/// Errors that abort reconciliation of one application.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The identifier does not name a loaded application.
    #[error("Application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    /// The catalog failed for another reason.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The permission store failed. Retrying later may succeed.
    #[error("Permission store unavailable: {0}")]
    StoreUnavailable(#[from] PermissionStoreError),
}

impl From<CatalogError> for ReconcileError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ApplicationNotFound(application) => Self::ApplicationNotFound(application),
            other => Self::Catalog(other.to_string()),
        }
    }
}

/// Changes computed for one application, before they are applied.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub changes: ChangeSet,
    /// Handlers skipped because they are on the ignore list.
    pub ignored: Vec<HandlerIdentity>,
    /// Number of handlers the application declares.
    pub handlers: usize,
    /// Existing records neither relabeled nor deleted.
    pub unchanged: usize,
}

/// Result of reconciling one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationReport {
    pub application: ApplicationId,
    pub mode: ReconcileMode,
    pub handlers: usize,
    pub created: Vec<PermissionKey>,
    pub relabeled: Vec<PermissionKey>,
    pub deleted: Vec<PermissionKey>,
    /// Creates skipped because the key already existed.
    pub conflicts: Vec<PermissionKey>,
    pub ignored: Vec<HandlerIdentity>,
    pub unchanged: usize,
}

impl ApplicationReport {
    /// Whether the run changed any record.
    pub fn changed(&self) -> bool {
        !(self.created.is_empty() && self.relabeled.is_empty() && self.deleted.is_empty())
    }
}

/// An application whose reconciliation failed.
#[derive(Debug)]
pub struct ApplicationFailure {
    pub application: ApplicationId,
    pub error: ReconcileError,
}

/// Result of a multi-application run.
#[derive(Debug)]
pub struct ReconcileReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Successful applications, in request order.
    pub applications: Vec<ApplicationReport>,
    /// Failed applications, in request order.
    pub failures: Vec<ApplicationFailure>,
}

impl ReconcileReport {
    /// True when no application failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn created(&self) -> usize {
        self.applications.iter().map(|a| a.created.len()).sum()
    }

    pub fn deleted(&self) -> usize {
        self.applications.iter().map(|a| a.deleted.len()).sum()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Aligns persisted permission records with the handler catalog.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use viewgate_core::{
///     ApplicationId, HandlerRegistration, IgnoreFilter, MemoryPermissionStore,
///     ReconcileMode, ReconcileOptions, Reconciler, StaticCatalog, Synthesizer,
/// };
///
/// # tokio_test::block_on(async {
/// let catalog = StaticCatalog::builder()
///     .handler("billing", HandlerRegistration::class("billing.views", "Invoice"))
///     .build()
///     .unwrap();
/// let store = Arc::new(MemoryPermissionStore::new());
///
/// let reconciler = Reconciler::new(
///     Arc::new(catalog),
///     store.clone(),
///     Synthesizer::default(),
///     Arc::new(IgnoreFilter::default()),
/// );
///
/// let report = reconciler
///     .reconcile_application(&ApplicationId::new("billing"), ReconcileOptions::default())
///     .await
///     .unwrap();
/// assert_eq!(report.created[0].as_str(), "access_view_billing.views.Invoice");
/// # });
/// ```
pub struct Reconciler {
    catalog: Arc<dyn HandlerCatalog>,
    store: Arc<dyn PermissionStore>,
    synthesizer: Synthesizer,
    ignore: Arc<IgnoreFilter>,
    concurrency: usize,
    locks: parking_lot::Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    /// Create a reconciler that processes one application at a time.
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
            concurrency: 1,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile up to `n` applications concurrently.
    ///
    /// Runs for the same application are always serialized.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Compute the changes a run would make, without applying them.
    pub async fn plan(
        &self,
        application: &ApplicationId,
        options: ReconcileOptions,
    ) -> Result<ReconcilePlan, ReconcileError> {
        let handlers = self.catalog.handlers(application)?;
        let existing = self.store.list_permissions(application).await?;

        let mut plan = ReconcilePlan {
            changes: ChangeSet::new(application.clone()),
            ignored: Vec::new(),
            handlers: handlers.len(),
            unchanged: 0,
        };

        if options.mode == ReconcileMode::RemoveAll {
            plan.changes.delete = existing.into_iter().map(|r| r.key).collect();
            return Ok(plan);
        }

        let existing_by_key: HashMap<&PermissionKey, &PermissionRecord> =
            existing.iter().map(|r| (&r.key, r)).collect();
        let mut live = HashSet::new();

        for handler in &handlers {
            if self.ignore.is_ignored(handler) {
                debug!(application = %application, handler = %handler, "Handler ignored");
                plan.ignored.push(handler.clone());
                continue;
            }

            let label_token = self.catalog.label_token(handler);
            let permission = self.synthesizer.synthesize(handler, label_token.as_deref());
            if !live.insert(permission.key.clone()) || !options.mode.creates() {
                continue;
            }

            match existing_by_key.get(&permission.key) {
                Some(record) if options.refresh_labels && record.label != permission.label => {
                    plan.changes
                        .relabel
                        .push((permission.key, permission.label));
                }
                Some(_) => {}
                None => plan.changes.create.push(PermissionRecord::new(
                    permission.key,
                    permission.label,
                    application.clone(),
                )),
            }
        }

        if options.mode.prunes() {
            plan.changes.delete = existing
                .iter()
                .filter(|r| !live.contains(&r.key))
                .map(|r| r.key.clone())
                .collect();
        }

        plan.unchanged = existing.len() - plan.changes.relabel.len() - plan.changes.delete.len();
        Ok(plan)
    }

    /// Reconcile one application.
    pub async fn reconcile_application(
        &self,
        application: &ApplicationId,
        options: ReconcileOptions,
    ) -> Result<ApplicationReport, ReconcileError> {
        let lock = self.lock_for(application);
        let _guard = lock.lock().await;

        let plan = self.plan(application, options).await?;
        info!(
            application = %application,
            mode = %options.mode,
            handlers = plan.handlers,
            ignored = plan.ignored.len(),
            "Reconciling application"
        );

        let outcome = self.store.apply(&plan.changes).await?;

        for key in &outcome.created {
            info!(application = %application, key = %key, "Permission created");
        }
        for key in &outcome.relabeled {
            info!(application = %application, key = %key, "Permission label updated");
        }
        for key in &outcome.deleted {
            info!(application = %application, key = %key, "Permission deleted");
        }
        for key in &outcome.conflicts {
            warn!(
                application = %application,
                key = %key,
                "Permission key already exists, skipped"
            );
        }

        Ok(ApplicationReport {
            application: application.clone(),
            mode: options.mode,
            handlers: plan.handlers,
            created: outcome.created,
            relabeled: outcome.relabeled,
            deleted: outcome.deleted,
            conflicts: outcome.conflicts,
            ignored: plan.ignored,
            unchanged: plan.unchanged,
        })
    }

    /// Reconcile several applications.
    ///
    /// A failing application is recorded in the report and does not stop
    /// the others.
    pub async fn reconcile(
        &self,
        applications: &[ApplicationId],
        options: ReconcileOptions,
    ) -> ReconcileReport {
        let started_at = Utc::now();
        info!(
            applications = applications.len(),
            mode = %options.mode,
            "Reconciliation started"
        );

        let results: Vec<_> = stream::iter(applications.iter().cloned())
            .map(|application| async move {
                let result = self.reconcile_application(&application, options).await;
                (application, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = ReconcileReport {
            started_at,
            finished_at: started_at,
            applications: Vec::new(),
            failures: Vec::new(),
        };
        for (application, result) in results {
            match result {
                Ok(app_report) => report.applications.push(app_report),
                Err(error) => {
                    error!(application = %application, error = %error, "Reconciliation failed");
                    report.failures.push(ApplicationFailure { application, error });
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            created = report.created(),
            deleted = report.deleted(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Reconciliation finished"
        );
        report
    }

    /// Reconcile every application in the catalog, in registry order.
    pub async fn reconcile_all(&self, options: ReconcileOptions) -> ReconcileReport {
        let applications = self.catalog.applications();
        self.reconcile(&applications, options).await
    }

    fn lock_for(&self, application: &ApplicationId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(application.clone())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HandlerRegistration, StaticCatalog};
    use crate::store::MemoryPermissionStore;
    use crate::test_utils::FailingStore;
    use crate::translate::MessageCatalog;

    fn catalog() -> StaticCatalog {
        StaticCatalog::builder()
            .handler("shop", HandlerRegistration::function("shop.views", "cart"))
            .handler("shop", HandlerRegistration::class("shop.views", "Checkout"))
            .handler("shop", HandlerRegistration::function("shop.views", "health"))
            .handler("billing", HandlerRegistration::class("billing.views", "Invoice"))
            .build()
            .unwrap()
    }

    fn reconciler_with(
        catalog: StaticCatalog,
        store: Arc<dyn PermissionStore>,
        ignore: &[&str],
    ) -> Reconciler {
        Reconciler::new(
            Arc::new(catalog),
            store,
            Synthesizer::default(),
            Arc::new(IgnoreFilter::new(ignore.iter().copied())),
        )
    }

    fn keys(records: &[PermissionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.key.as_str()).collect()
    }

    fn shop() -> ApplicationId {
        ApplicationId::new("shop")
    }

    #[tokio::test]
    async fn test_create_covers_every_non_ignored_handler() {
        let store = Arc::new(MemoryPermissionStore::new());
        let reconciler = reconciler_with(catalog(), store.clone(), &["shop.views.health"]);

        let report = reconciler
            .reconcile_application(&shop(), ReconcileOptions::new(ReconcileMode::Create))
            .await
            .unwrap();

        assert_eq!(report.handlers, 3);
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.ignored, vec![HandlerIdentity::new("shop.views", "health")]);

        let records = store.list_permissions(&shop()).await.unwrap();
        assert_eq!(
            keys(&records),
            vec!["access_view_shop.views.Checkout", "access_view_shop.views.cart"]
        );
        for record in &records {
            assert_eq!(record.application, shop());
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = Arc::new(MemoryPermissionStore::new());
        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        let options = ReconcileOptions::new(ReconcileMode::Create);

        reconciler.reconcile_application(&shop(), options).await.unwrap();
        let first = store.list_permissions(&shop()).await.unwrap();

        let second_report = reconciler.reconcile_application(&shop(), options).await.unwrap();
        let second = store.list_permissions(&shop()).await.unwrap();

        assert!(!second_report.changed());
        assert_eq!(second_report.unchanged, 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_leaves_existing_labels_alone() {
        let store = Arc::new(MemoryPermissionStore::new());
        store
            .create_permission(PermissionRecord::new(
                "access_view_shop.views.cart".into(),
                "Hand-edited label",
                shop(),
            ))
            .await
            .unwrap();

        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        reconciler
            .reconcile_application(&shop(), ReconcileOptions::new(ReconcileMode::Create))
            .await
            .unwrap();

        let record = store
            .get_permission(&"access_view_shop.views.cart".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "Hand-edited label");
    }

    #[tokio::test]
    async fn test_refresh_labels_updates_changed_translation() {
        let catalog = StaticCatalog::builder()
            .handler(
                "shop",
                HandlerRegistration::function("shop.views", "cart").label("shop.cart"),
            )
            .build()
            .unwrap();
        let store = Arc::new(MemoryPermissionStore::new());

        let english = MessageCatalog::new("en").with_message("en", "shop.cart", "Cart");
        let reconciler = Reconciler::new(
            Arc::new(catalog.clone()),
            store.clone(),
            Synthesizer::default().with_translator(Arc::new(english)),
            Arc::new(IgnoreFilter::default()),
        );
        reconciler
            .reconcile_application(&shop(), ReconcileOptions::default())
            .await
            .unwrap();

        let german = MessageCatalog::new("de").with_message("de", "shop.cart", "Warenkorb");
        let reconciler = Reconciler::new(
            Arc::new(catalog),
            store.clone(),
            Synthesizer::default().with_translator(Arc::new(german)),
            Arc::new(IgnoreFilter::default()),
        );
        let report = reconciler
            .reconcile_application(
                &shop(),
                ReconcileOptions::default().with_refresh_labels(true),
            )
            .await
            .unwrap();

        assert_eq!(report.relabeled.len(), 1);
        let record = store
            .get_permission(&"access_view_shop.views.cart".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "Warenkorb");
    }

    #[tokio::test]
    async fn test_prune_removes_orphaned_records() {
        let store = Arc::new(MemoryPermissionStore::new());
        store
            .create_permission(PermissionRecord::new(
                "access_view_shop.views.removed".into(),
                "shop.views.removed",
                shop(),
            ))
            .await
            .unwrap();
        store
            .create_permission(PermissionRecord::new(
                "access_view_shop.views.cart".into(),
                "shop.views.cart",
                shop(),
            ))
            .await
            .unwrap();

        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        let report = reconciler
            .reconcile_application(&shop(), ReconcileOptions::new(ReconcileMode::PruneOrphaned))
            .await
            .unwrap();

        assert_eq!(report.deleted, vec![PermissionKey::new("access_view_shop.views.removed")]);
        assert!(report.created.is_empty());
        assert_eq!(report.unchanged, 1);

        let records = store.list_permissions(&shop()).await.unwrap();
        assert_eq!(keys(&records), vec!["access_view_shop.views.cart"]);
    }

    #[tokio::test]
    async fn test_newly_ignored_handler_is_pruned() {
        let store = Arc::new(MemoryPermissionStore::new());

        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        reconciler
            .reconcile_application(&shop(), ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(store.list_permissions(&shop()).await.unwrap().len(), 3);

        let reconciler = reconciler_with(catalog(), store.clone(), &["shop.views.health"]);
        let report = reconciler
            .reconcile_application(&shop(), ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(
            report.deleted,
            vec![PermissionKey::new("access_view_shop.views.health")]
        );
        let records = store.list_permissions(&shop()).await.unwrap();
        assert!(!keys(&records).contains(&"access_view_shop.views.health"));
    }

    #[tokio::test]
    async fn test_remove_all_only_touches_own_application() {
        let store = Arc::new(MemoryPermissionStore::new());
        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        reconciler.reconcile_all(ReconcileOptions::default()).await;

        let report = reconciler
            .reconcile_application(&shop(), ReconcileOptions::new(ReconcileMode::RemoveAll))
            .await
            .unwrap();

        assert_eq!(report.deleted.len(), 3);
        assert!(store.list_permissions(&shop()).await.unwrap().is_empty());
        assert_eq!(
            store
                .list_permissions(&ApplicationId::new("billing"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let store = Arc::new(MemoryPermissionStore::new());
        let reconciler = reconciler_with(catalog(), store, &[]);

        let result = reconciler
            .reconcile_application(&ApplicationId::new("nope"), ReconcileOptions::default())
            .await;
        assert!(matches!(result, Err(ReconcileError::ApplicationNotFound(_))));
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_other_applications() {
        let store = Arc::new(FailingStore::new());
        store.fail_application(&shop());
        let reconciler = reconciler_with(catalog(), store.clone(), &[]).with_concurrency(2);

        let apps = vec![
            ApplicationId::new("nope"),
            shop(),
            ApplicationId::new("billing"),
        ];
        let report = reconciler.reconcile(&apps, ReconcileOptions::default()).await;

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].application, ApplicationId::new("nope"));
        assert!(matches!(
            report.failures[1].error,
            ReconcileError::StoreUnavailable(_)
        ));

        assert_eq!(report.applications.len(), 1);
        assert_eq!(report.applications[0].application, ApplicationId::new("billing"));
        assert_eq!(report.created(), 1);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_reported_not_fatal() {
        let store = Arc::new(MemoryPermissionStore::new());
        // A stale record for the same key, owned by another application
        store
            .create_permission(PermissionRecord::new(
                "access_view_shop.views.cart".into(),
                "shop.views.cart",
                ApplicationId::new("legacy"),
            ))
            .await
            .unwrap();

        let reconciler = reconciler_with(catalog(), store.clone(), &[]);
        let report = reconciler
            .reconcile_application(&shop(), ReconcileOptions::new(ReconcileMode::Create))
            .await
            .unwrap();

        assert_eq!(
            report.conflicts,
            vec![PermissionKey::new("access_view_shop.views.cart")]
        );
        assert_eq!(report.created.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_does_not_write() {
        let store = Arc::new(MemoryPermissionStore::new());
        let reconciler = reconciler_with(catalog(), store.clone(), &[]);

        let plan = reconciler
            .plan(&shop(), ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(plan.changes.create.len(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_mode_flags() {
        assert!(ReconcileMode::Create.creates());
        assert!(!ReconcileMode::Create.prunes());
        assert!(ReconcileMode::PruneOrphaned.prunes());
        assert!(!ReconcileMode::PruneOrphaned.creates());
        assert!(!ReconcileMode::RemoveAll.creates());
        assert!(!ReconcileMode::RemoveAll.prunes());
        assert_eq!(ReconcileMode::default(), ReconcileMode::CreateAndPrune);
        assert_eq!(ReconcileMode::PruneOrphaned.to_string(), "prune-orphaned");
    }
}
