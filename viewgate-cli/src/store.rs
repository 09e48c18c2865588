use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use viewgate_core::{
    ApplicationId, ApplyOutcome, ChangeSet, PermissionKey, PermissionRecord, PermissionStore,
    PermissionStoreError, Principal,
};

/// Default database location, relative to the working directory.
pub const DEFAULT_DATABASE: &str = ".viewgate/permissions.db";

/// SQLite-based permission storage
///
/// Records live in a `permissions` table and grants in a `grants` table.
/// Each [`ChangeSet`] is applied in one transaction.
///
/// # Example
/// ```no_run
/// use viewgate_cli::SqlitePermissionStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqlitePermissionStore::new(".viewgate/permissions.db")?;
/// # Ok(())
/// # }
/// ```
pub struct SqlitePermissionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePermissionStore {
    /// Create new SQLite store at path
    ///
    /// Creates the database file and tables if they don't exist.
    /// Path can be relative or absolute.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PermissionStoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            PermissionStoreError::Unavailable(format!("Failed to open database: {}", e))
        })?;

        conn.execute_batch(include_str!("schema.sql")).map_err(|e| {
            PermissionStoreError::Unavailable(format!("Failed to initialize schema: {}", e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Use default location (.viewgate/permissions.db in current directory)
    pub fn default_location() -> Result<Self, PermissionStoreError> {
        Self::new(DEFAULT_DATABASE)
    }

    /// Give `principal` the permission `key`.
    pub fn grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<(), PermissionStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO grants (principal, key) VALUES (?, ?)",
            params![principal.as_str(), key.as_str()],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    /// Take the permission `key` away from `principal`.
    ///
    /// Returns `true` if a grant was removed.
    pub fn revoke(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM grants WHERE principal = ? AND key = ?",
                params![principal.as_str(), key.as_str()],
            )
            .map_err(unavailable)?;
        Ok(removed > 0)
    }
}

fn unavailable(err: rusqlite::Error) -> PermissionStoreError {
    PermissionStoreError::Unavailable(err.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermissionRecord> {
    let created_at: i64 = row.get(3)?;
    Ok(PermissionRecord {
        key: PermissionKey::new(row.get::<_, String>(0)?),
        label: row.get(1)?,
        application: ApplicationId::new(row.get::<_, String>(2)?),
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
    })
}

/// Delete a record and its grants. Returns whether the record existed.
fn delete_record(
    conn: &Connection,
    key: &PermissionKey,
    application: Option<&ApplicationId>,
) -> rusqlite::Result<bool> {
    let removed = match application {
        Some(app) => conn.execute(
            "DELETE FROM permissions WHERE key = ? AND application = ?",
            params![key.as_str(), app.as_str()],
        )?,
        None => conn.execute(
            "DELETE FROM permissions WHERE key = ?",
            params![key.as_str()],
        )?,
    };
    if removed > 0 {
        conn.execute("DELETE FROM grants WHERE key = ?", params![key.as_str()])?;
    }
    Ok(removed > 0)
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn create_permission(
        &self,
        record: PermissionRecord,
    ) -> Result<(), PermissionStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO permissions (key, label, application, created_at) VALUES (?, ?, ?, ?)",
            params![
                record.key.as_str(),
                record.label,
                record.application.as_str(),
                record.created_at.timestamp()
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                PermissionStoreError::DuplicateKey(record.key.clone())
            } else {
                unavailable(e)
            }
        })?;
        Ok(())
    }

    async fn delete_permission(&self, key: &PermissionKey) -> Result<bool, PermissionStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        let removed = delete_record(&tx, key, None).map_err(unavailable)?;
        tx.commit().map_err(unavailable)?;
        Ok(removed)
    }

    async fn list_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PermissionRecord>, PermissionStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT key, label, application, created_at FROM permissions
                 WHERE application = ? ORDER BY key",
            )
            .map_err(unavailable)?;

        let records = stmt
            .query_map(params![application.as_str()], record_from_row)
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        Ok(records)
    }

    async fn get_permission(
        &self,
        key: &PermissionKey,
    ) -> Result<Option<PermissionRecord>, PermissionStoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT key, label, application, created_at FROM permissions WHERE key = ?",
            params![key.as_str()],
            record_from_row,
        )
        .optional()
        .map_err(unavailable)
    }

    async fn has_permissions(
        &self,
        application: &ApplicationId,
    ) -> Result<bool, PermissionStoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM permissions WHERE application = ?)",
            params![application.as_str()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(unavailable)
    }

    async fn has_grant(
        &self,
        principal: &Principal,
        key: &PermissionKey,
    ) -> Result<bool, PermissionStoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM grants WHERE principal = ? AND key = ?)",
            params![principal.as_str(), key.as_str()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(unavailable)
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<ApplyOutcome, PermissionStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        let app = changes.application.as_str();
        let mut outcome = ApplyOutcome::default();

        for record in &changes.create {
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO permissions (key, label, application, created_at)
                     VALUES (?, ?, ?, ?)",
                    params![
                        record.key.as_str(),
                        record.label,
                        record.application.as_str(),
                        record.created_at.timestamp()
                    ],
                )
                .map_err(unavailable)?;
            if inserted > 0 {
                outcome.created.push(record.key.clone());
            } else {
                outcome.conflicts.push(record.key.clone());
            }
        }

        for (key, label) in &changes.relabel {
            let updated = tx
                .execute(
                    "UPDATE permissions SET label = ?1
                     WHERE key = ?2 AND application = ?3 AND label != ?1",
                    params![label, key.as_str(), app],
                )
                .map_err(unavailable)?;
            if updated > 0 {
                outcome.relabeled.push(key.clone());
            }
        }

        for key in &changes.delete {
            if delete_record(&tx, key, Some(&changes.application)).map_err(unavailable)? {
                outcome.deleted.push(key.clone());
            }
        }

        tx.commit().map_err(unavailable)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(key: &str, app: &str) -> PermissionRecord {
        PermissionRecord::new(PermissionKey::new(key), key, ApplicationId::new(app))
    }

    fn temp_store() -> (SqlitePermissionStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqlitePermissionStore::new(dir.path().join("permissions.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (store, _dir) = temp_store();
        let shop = ApplicationId::new("shop");

        store.create_permission(record("b", "shop")).await.unwrap();
        store.create_permission(record("a", "shop")).await.unwrap();
        store.create_permission(record("c", "blog")).await.unwrap();

        let records = store.list_permissions(&shop).await.unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(store.has_permissions(&shop).await.unwrap());
        assert!(!store
            .has_permissions(&ApplicationId::new("none"))
            .await
            .unwrap());

        let fetched = store.get_permission(&"c".into()).await.unwrap().unwrap();
        assert_eq!(fetched, record("c", "blog"));
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let (store, _dir) = temp_store();
        store.create_permission(record("k", "shop")).await.unwrap();

        let err = store
            .create_permission(record("k", "blog"))
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionStoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_grants() {
        let (store, _dir) = temp_store();
        let alice = Principal::new("alice");
        let key = PermissionKey::new("k");

        assert!(!store.has_grant(&alice, &key).await.unwrap());
        store.grant(&alice, &key).unwrap();
        store.grant(&alice, &key).unwrap();
        assert!(store.has_grant(&alice, &key).await.unwrap());

        assert!(store.revoke(&alice, &key).unwrap());
        assert!(!store.revoke(&alice, &key).unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_grants() {
        let (store, _dir) = temp_store();
        let alice = Principal::new("alice");
        store.create_permission(record("k", "shop")).await.unwrap();
        store.grant(&alice, &"k".into()).unwrap();

        assert!(store.delete_permission(&"k".into()).await.unwrap());
        assert!(!store.delete_permission(&"k".into()).await.unwrap());
        assert!(!store.has_grant(&alice, &"k".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_in_transaction() {
        let (store, _dir) = temp_store();
        store.create_permission(record("old", "shop")).await.unwrap();
        store.create_permission(record("kept", "shop")).await.unwrap();
        store.create_permission(record("foreign", "blog")).await.unwrap();

        let mut changes = ChangeSet::new(ApplicationId::new("shop"));
        changes.create.push(record("new", "shop"));
        changes.create.push(record("foreign", "shop"));
        changes.relabel.push(("kept".into(), "Kept".to_string()));
        changes.relabel.push(("foreign".into(), "Stolen".to_string()));
        changes.delete.push("old".into());
        changes.delete.push("foreign".into());

        let outcome = store.apply(&changes).await.unwrap();
        assert_eq!(outcome.created, vec![PermissionKey::new("new")]);
        assert_eq!(outcome.conflicts, vec![PermissionKey::new("foreign")]);
        assert_eq!(outcome.relabeled, vec![PermissionKey::new("kept")]);
        assert_eq!(outcome.deleted, vec![PermissionKey::new("old")]);

        let foreign = store
            .get_permission(&"foreign".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(foreign.application, ApplicationId::new("blog"));
        assert_eq!(foreign.label, "foreign");

        // Same label again is not a change
        let mut again = ChangeSet::new(ApplicationId::new("shop"));
        again.relabel.push(("kept".into(), "Kept".to_string()));
        assert!(store.apply(&again).await.unwrap().relabeled.is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("permissions.db");

        {
            let store = SqlitePermissionStore::new(&path).unwrap();
            store.create_permission(record("k", "shop")).await.unwrap();
            store.grant(&Principal::new("alice"), &"k".into()).unwrap();
        }

        let store = SqlitePermissionStore::new(&path).unwrap();
        assert!(store.get_permission(&"k".into()).await.unwrap().is_some());
        assert!(store
            .has_grant(&Principal::new("alice"), &"k".into())
            .await
            .unwrap());
    }
}
