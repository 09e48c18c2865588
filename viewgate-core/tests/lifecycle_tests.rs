mod common;

use common::{billing, blog, sample_catalog};
use std::sync::Arc;
use tempfile::TempDir;
use viewgate_core::{
    DecisionReason, FilePermissionStore, MemoryPermissionStore, PermissionKey, PermissionStore,
    Principal, ReconcileMode, ReconcileOptions, ViewGate, ViewGateConfig,
};

fn invoice_key() -> PermissionKey {
    PermissionKey::new("access_view_billing.views.Invoice")
}

#[tokio::test]
async fn test_invoice_scenario() {
    let store = Arc::new(MemoryPermissionStore::new());
    let gate = ViewGate::builder()
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();

    let report = gate
        .reconciler()
        .reconcile(&[billing()], ReconcileOptions::new(ReconcileMode::Create))
        .await;
    assert!(report.is_success());

    let record = store.get_permission(&invoice_key()).await.unwrap().unwrap();
    assert_eq!(record.label, "billing.views.Invoice");
    assert_eq!(record.application, billing());

    let carol = Principal::new("carol");
    let enforcer = gate.enforcer();

    let decision = enforcer.decide(Some(&carol), "/invoices/:id").await.unwrap();
    assert!(decision.is_denied());
    assert_eq!(decision.reason, DecisionReason::PermissionMissing);

    store.grant(&carol, &invoice_key());
    let decision = enforcer.decide(Some(&carol), "/invoices/:id").await.unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.reason, DecisionReason::PermissionHeld);
}

#[tokio::test]
async fn test_application_without_records_is_permissive() {
    let store = Arc::new(MemoryPermissionStore::new());
    let gate = ViewGate::builder()
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();

    gate.reconciler()
        .reconcile(&[billing()], ReconcileOptions::default())
        .await;

    let enforcer = gate.enforcer();
    for principal in [None, Some(Principal::new("dave"))] {
        let decision = enforcer.decide(principal.as_ref(), "/blog").await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.reason, DecisionReason::ApplicationNotEnforced);
    }
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permissions.json");

    {
        let store = Arc::new(FilePermissionStore::new(&path));
        let gate = ViewGate::builder()
            .catalog(sample_catalog())
            .store(store.clone())
            .build()
            .unwrap();
        let report = gate.reconciler().reconcile_all(ReconcileOptions::default()).await;
        assert!(report.is_success());
        assert_eq!(report.created(), 3);

        store.grant(&Principal::new("erin"), &invoice_key()).unwrap();
    }

    let store = Arc::new(FilePermissionStore::new(&path));
    assert_eq!(store.list_permissions(&billing()).await.unwrap().len(), 2);
    assert_eq!(store.list_permissions(&blog()).await.unwrap().len(), 1);

    let gate = ViewGate::builder()
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();

    let second = gate.reconciler().reconcile_all(ReconcileOptions::default()).await;
    assert_eq!(second.created(), 0);
    assert_eq!(second.deleted(), 0);

    let decision = gate
        .enforcer()
        .decide(Some(&Principal::new("erin")), "/invoices/:id")
        .await
        .unwrap();
    assert_eq!(decision.reason, DecisionReason::PermissionHeld);
}

#[tokio::test]
async fn test_ignore_added_later_prunes_and_allows() {
    let store = Arc::new(MemoryPermissionStore::new());

    let gate = ViewGate::builder()
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();
    gate.reconciler().reconcile_all(ReconcileOptions::default()).await;

    let health = PermissionKey::new("access_view_billing.views.health");
    assert!(store.get_permission(&health).await.unwrap().is_some());

    let gate = ViewGate::builder()
        .config(ViewGateConfig {
            ignore: vec!["billing.views.health".to_string()],
            ..Default::default()
        })
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();

    // Ignored handlers are allowed even while the stale record exists
    let decision = gate.enforcer().decide(None, "/billing/health").await.unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.reason, DecisionReason::NoPermissionDefined);

    let report = gate
        .reconciler()
        .reconcile(&[billing()], ReconcileOptions::new(ReconcileMode::PruneOrphaned))
        .await;
    assert_eq!(report.applications[0].deleted, vec![health.clone()]);
    assert!(store.get_permission(&health).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_all_returns_application_to_permissive() {
    let store = Arc::new(MemoryPermissionStore::new());
    let gate = ViewGate::builder()
        .catalog(sample_catalog())
        .store(store.clone())
        .build()
        .unwrap();
    gate.reconciler().reconcile_all(ReconcileOptions::default()).await;

    let enforcer = gate.enforcer();
    assert!(enforcer.decide(None, "/invoices/:id").await.unwrap().is_denied());

    gate.reconciler()
        .reconcile(&[billing()], ReconcileOptions::new(ReconcileMode::RemoveAll))
        .await;

    let decision = enforcer.decide(None, "/invoices/:id").await.unwrap();
    assert_eq!(decision.reason, DecisionReason::ApplicationNotEnforced);
}
