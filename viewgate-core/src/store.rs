//! Permission record storage trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::handler::{ApplicationId, Principal};
use crate::synth::PermissionKey;

/// Errors that can occur in permission store operations.
#[derive(Debug, thiserror::Error)]
pub enum PermissionStoreError {
    /// The backing store could not be reached or failed mid-operation.
    #[error("Permission store unavailable: {0}")]
    Unavailable(String),

    /// A record with this key already exists.
    #[error("Duplicate permission key: {0}")]
    DuplicateKey(PermissionKey),

    /// IO error during storage operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PermissionStoreError {
    /// Whether retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// A persisted per-handler permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// Synthesized permission key, unique across the store.
    pub key: PermissionKey,

    /// Human-readable label.
    pub label: String,

    /// Application whose reconciliation created the record.
    pub application: ApplicationId,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl PermissionRecord {
    pub fn new(key: PermissionKey, label: impl Into<String>, application: ApplicationId) -> Self {
        Self {
            key,
            label: label.into(),
            application,
            created_at: Utc::now(),
        }
    }
}

impl PartialEq for PermissionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.label == other.label && self.application == other.application
    }
}

impl Eq for PermissionRecord {}

/// Changes to one application's records, applied as a single unit.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub application: ApplicationId,
    pub create: Vec<PermissionRecord>,
    pub relabel: Vec<(PermissionKey, String)>,
    pub delete: Vec<PermissionKey>,
}

impl ChangeSet {
    pub fn new(application: ApplicationId) -> Self {
        Self {
            application,
            create: Vec::new(),
            relabel: Vec::new(),
            delete: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.relabel.is_empty() && self.delete.is_empty()
    }
}

/// What [`PermissionStore::apply`] actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub created: Vec<PermissionKey>,
    pub relabeled: Vec<PermissionKey>,
    pub deleted: Vec<PermissionKey>,
    /// Creates skipped because the key already existed.
    pub conflicts: Vec<PermissionKey>,
}

/// Trait for permission record storage.
///
/// Records are written only by reconciliation. Grants relating principals
/// to keys are owned by whatever manages users and roles; the store only
/// answers whether one exists.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Insert a record. Fails with [`PermissionStoreError::DuplicateKey`] if
    /// the key is taken.
    async fn create_permission(&self, record: PermissionRecord)
        -> Result<(), PermissionStoreError>;

    /// Remove a record by key, together with every grant of it.
    ///
    /// Returns `true` if a record was removed, `false` if not found.
    async fn delete_permission(&self, key: &PermissionKey) -> Result<bool, PermissionStoreError>;

    /// All records owned by an application.
    async fn list_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PermissionRecord>, PermissionStoreError>;

    /// Point lookup of one record.
    async fn get_permission(
        &self,
        key: &PermissionKey,
    ) -> Result<Option<PermissionRecord>, PermissionStoreError>;

    /// Whether the application owns at least one record.
    async fn has_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<bool, PermissionStoreError> {
        Ok(!self.list_permissions(application).await?.is_empty())
    }

    /// Whether `principal` holds the permission `key`.
    async fn has_grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError>;

    /// Apply a change set all-or-nothing.
    ///
    /// Creates whose key already exists are skipped and reported in
    /// [`ApplyOutcome::conflicts`]. Relabels and deletes only touch records
    /// owned by `changes.application`.
    async fn apply(&self, changes: &ChangeSet) -> Result<ApplyOutcome, PermissionStoreError>;
}

/// Records and grants shared by the memory and file stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PermissionTable {
    #[serde(default)]
    records: BTreeMap<PermissionKey, PermissionRecord>,
    #[serde(default)]
    grants: BTreeMap<Principal, BTreeSet<PermissionKey>>,
}

impl PermissionTable {
    fn create(&mut self, record: PermissionRecord) -> Result<(), PermissionStoreError> {
        if self.records.contains_key(&record.key) {
            return Err(PermissionStoreError::DuplicateKey(record.key));
        }
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    fn delete(&mut self, key: &PermissionKey) -> bool {
        if self.records.remove(key).is_none() {
            return false;
        }
        for keys in self.grants.values_mut() {
            keys.remove(key);
        }
        true
    }

    fn list(&self, application: &ApplicationId) -> Vec<PermissionRecord> {
        self.records
            .values()
            .filter(|r| &r.application == application)
            .cloned()
            .collect()
    }

    fn owns_any(&self, application: &ApplicationId) -> bool {
        self.records.values().any(|r| &r.application == application)
    }

    fn has_grant(&self, principal: &Principal, key: &PermissionKey) -> bool {
        self.grants
            .get(principal)
            .is_some_and(|keys| keys.contains(key))
    }

    fn grant(&mut self, principal: Principal, key: PermissionKey) {
        self.grants.entry(principal).or_default().insert(key);
    }

    fn revoke(&mut self, principal: &Principal, key: &PermissionKey) -> bool {
        self.grants
            .get_mut(principal)
            .is_some_and(|keys| keys.remove(key))
    }

    fn apply(&mut self, changes: &ChangeSet) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for record in &changes.create {
            match self.create(record.clone()) {
                Ok(()) => outcome.created.push(record.key.clone()),
                Err(_) => outcome.conflicts.push(record.key.clone()),
            }
        }

        for (key, label) in &changes.relabel {
            if let Some(record) = self.records.get_mut(key) {
                if record.application == changes.application && &record.label != label {
                    record.label = label.clone();
                    outcome.relabeled.push(key.clone());
                }
            }
        }

        for key in &changes.delete {
            let owned = self
                .records
                .get(key)
                .is_some_and(|r| r.application == changes.application);
            if owned && self.delete(key) {
                outcome.deleted.push(key.clone());
            }
        }

        outcome
    }
}

/// In-memory permission store.
///
/// Records and grants are lost when the process exits. Useful for tests and
/// for hosts that rebuild their permissions at every start.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    table: RwLock<PermissionTable>,
}

impl MemoryPermissionStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `principal` holds `key`.
    pub fn grant(&self, principal: &Principal, key: &PermissionKey) {
        self.table.write().grant(principal.clone(), key.clone());
    }

    /// Remove a grant. Returns `true` if it existed.
    pub fn revoke(&self, principal: &Principal, key: &PermissionKey) -> bool {
        self.table.write().revoke(principal, key)
    }

    /// Number of records across all applications.
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn create_permission(
        &self,
        record: PermissionRecord,
    ) -> Result<(), PermissionStoreError> {
        self.table.write().create(record)
    }

    async fn delete_permission(&self, key: &PermissionKey) -> Result<bool, PermissionStoreError> {
        Ok(self.table.write().delete(key))
    }

    async fn list_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PermissionRecord>, PermissionStoreError> {
        Ok(self.table.read().list(application))
    }

    async fn get_permission(
        &self,
        key: &PermissionKey,
    ) -> Result<Option<PermissionRecord>, PermissionStoreError> {
        Ok(self.table.read().records.get(key).cloned())
    }

    async fn has_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<bool, PermissionStoreError> {
        Ok(self.table.read().owns_any(application))
    }

    async fn has_grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError> {
        Ok(self.table.read().has_grant(principal, key))
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<ApplyOutcome, PermissionStoreError> {
        Ok(self.table.write().apply(changes))
    }
}

/// File-based permission store.
///
/// Records and grants are persisted to a JSON file. The file is created
/// automatically on the first write.
pub struct FilePermissionStore {
    path: PathBuf,
    cache: RwLock<Option<PermissionTable>>,
}

impl FilePermissionStore {
    /// Create a new file-based store at the given path.
    ///
    /// The file does not need to exist - it will be created when
    /// the first record or grant is saved.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Record that `principal` holds `key`.
    pub fn grant(&self, principal: &Principal, key: &PermissionKey) -> Result<(), PermissionStoreError> {
        self.update(|table| {
            table.grant(principal.clone(), key.clone());
            Ok(())
        })
    }

    /// Remove a grant. Returns `true` if it existed.
    pub fn revoke(&self, principal: &Principal, key: &PermissionKey) -> Result<bool, PermissionStoreError> {
        self.update(|table| Ok(table.revoke(principal, key)))
    }

    /// Load the table from file into cache if not already loaded.
    fn ensure_loaded(&self) -> Result<(), PermissionStoreError> {
        let mut cache = self.cache.write();
        if cache.is_some() {
            return Ok(());
        }

        let table = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                PermissionTable::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            PermissionTable::default()
        };

        *cache = Some(table);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&PermissionTable) -> T) -> Result<T, PermissionStoreError> {
        self.ensure_loaded()?;
        let cache = self.cache.read();
        let table = cache
            .as_ref()
            .ok_or_else(|| PermissionStoreError::Unavailable("cache not loaded".to_string()))?;
        Ok(f(table))
    }

    /// Run `f` on a copy of the table, write it out, then publish it.
    ///
    /// The cache only changes once the file has been written.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut PermissionTable) -> Result<T, PermissionStoreError>,
    ) -> Result<T, PermissionStoreError> {
        self.ensure_loaded()?;
        let mut cache = self.cache.write();
        let mut table = cache.clone().unwrap_or_default();
        let result = f(&mut table)?;
        self.flush(&table)?;
        *cache = Some(table);
        Ok(result)
    }

    fn flush(&self, table: &PermissionTable) -> Result<(), PermissionStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(table)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for FilePermissionStore {
    async fn create_permission(
        &self,
        record: PermissionRecord,
    ) -> Result<(), PermissionStoreError> {
        self.update(|table| table.create(record))
    }

    async fn delete_permission(&self, key: &PermissionKey) -> Result<bool, PermissionStoreError> {
        if !self.read(|table| table.records.contains_key(key))? {
            return Ok(false);
        }
        self.update(|table| Ok(table.delete(key)))
    }

    async fn list_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PermissionRecord>, PermissionStoreError> {
        self.read(|table| table.list(application))
    }

    async fn get_permission(
        &self,
        key: &PermissionKey,
    ) -> Result<Option<PermissionRecord>, PermissionStoreError> {
        self.read(|table| table.records.get(key).cloned())
    }

    async fn has_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<bool, PermissionStoreError> {
        self.read(|table| table.owns_any(application))
    }

    async fn has_grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError> {
        self.read(|table| table.has_grant(principal, key))
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<ApplyOutcome, PermissionStoreError> {
        if changes.is_empty() {
            return Ok(ApplyOutcome::default());
        }
        self.update(|table| Ok(table.apply(changes)))
    }
}
