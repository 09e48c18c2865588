//! Test utilities for viewgate-core.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! viewgate-core = { version = "...", features = ["test-utils"] }
//! ```

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::handler::{ApplicationId, Principal};
use crate::store::{
    ApplyOutcome, ChangeSet, MemoryPermissionStore, PermissionRecord, PermissionStore,
    PermissionStoreError,
};
use crate::synth::PermissionKey;

/// A permission store that can be told to fail.
///
/// Wraps a [`MemoryPermissionStore`]. Reads and writes scoped to a failing
/// application return [`PermissionStoreError::Unavailable`],
/// [`fail_grants`](Self::fail_grants) fails only grant checks, and
/// [`fail_all`](Self::fail_all) makes every call fail.
///
/// # Example
///
/// ```rust
/// use viewgate_core::test_utils::FailingStore;
/// use viewgate_core::{ApplicationId, PermissionStore};
///
/// # tokio_test::block_on(async {
/// let store = FailingStore::new();
/// store.fail_application(&ApplicationId::new("shop"));
///
/// let result = store.list_permissions(&ApplicationId::new("shop")).await;
/// assert!(result.is_err());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryPermissionStore,
    failing: parking_lot::Mutex<HashSet<ApplicationId>>,
    fail_grants: AtomicBool,
    fail_all: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for seeding records and grants.
    pub fn inner(&self) -> &MemoryPermissionStore {
        &self.inner
    }

    /// Fail every call scoped to `application`.
    pub fn fail_application(&self, application: &ApplicationId) {
        self.failing.lock().insert(application.clone());
    }

    /// Fail grant checks only, or stop failing them.
    pub fn fail_grants(&self, fail: bool) {
        self.fail_grants.store(fail, Ordering::SeqCst);
    }

    /// Fail every call, or stop failing.
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn check(&self, application: Option<&ApplicationId>) -> Result<(), PermissionStoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(PermissionStoreError::Unavailable(
                "store is offline".to_string(),
            ));
        }
        match application {
            Some(app) if self.failing.lock().contains(app) => Err(
                PermissionStoreError::Unavailable(format!("store is offline for {}", app)),
            ),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PermissionStore for FailingStore {
    async fn create_permission(
        &self,
        record: PermissionRecord,
    ) -> Result<(), PermissionStoreError> {
        self.check(Some(&record.application))?;
        self.inner.create_permission(record).await
    }

    async fn delete_permission(&self, key: &PermissionKey) -> Result<bool, PermissionStoreError> {
        self.check(None)?;
        self.inner.delete_permission(key).await
    }

    async fn list_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PermissionRecord>, PermissionStoreError> {
        self.check(Some(application))?;
        self.inner.list_permissions(application).await
    }

    async fn get_permission(
        &self,
        key: &PermissionKey,
    ) -> Result<Option<PermissionRecord>, PermissionStoreError> {
        self.check(None)?;
        self.inner.get_permission(key).await
    }

    async fn has_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<bool, PermissionStoreError> {
        self.check(Some(application))?;
        self.inner.has_permissions(application).await
    }

    async fn has_grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError> {
        self.check(None)?;
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(PermissionStoreError::Unavailable(
                "grant lookup failed".to_string(),
            ));
        }
        self.inner.has_grant(principal, key).await
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<ApplyOutcome, PermissionStoreError> {
        self.check(Some(&changes.application))?;
        self.inner.apply(changes).await
    }
}
