//! Databases and the engine that hosts them
//!
//! An open request raises exactly one of three events, mirroring an indexed
//! storage host: success, upgrade-needed (the requested version is newer than
//! the stored one) or error.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::RwLock as StoreLock;

use crate::errors::{StoreError, StoreResult};

use super::store::ObjectStore;
use super::transaction::{StoreGuard, Transaction, TransactionMode};

#[derive(Debug)]
struct StoreEntry {
    key_path: String,
    indexes: Vec<String>,
    data: Arc<StoreLock<ObjectStore>>,
}

#[derive(Debug, Default)]
struct Catalog {
    version: u32,
    stores: BTreeMap<String, StoreEntry>,
}

#[derive(Debug)]
struct DatabaseState {
    name: String,
    catalog: RwLock<Catalog>,
}

/// Handle to an open database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    state: Arc<DatabaseState>,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn version(&self) -> u32 {
        self.read_catalog(|c| c.version)
    }

    pub fn store_names(&self) -> Vec<String> {
        self.read_catalog(|c| c.stores.keys().cloned().collect())
    }

    pub fn contains_store(&self, store: &str) -> bool {
        self.read_catalog(|c| c.stores.contains_key(store))
    }

    /// Index names of a store.
    ///
    /// Read from the catalog, so it never waits on a running transaction.
    pub fn index_names(&self, store: &str) -> StoreResult<Vec<String>> {
        self.read_catalog(|c| c.stores.get(store).map(|e| e.indexes.clone()))
            .ok_or_else(|| StoreError::store_not_found(store))
    }

    /// Key path of a store
    pub fn key_path(&self, store: &str) -> StoreResult<String> {
        self.read_catalog(|c| c.stores.get(store).map(|e| e.key_path.clone()))
            .ok_or_else(|| StoreError::store_not_found(store))
    }

    /// Opens a transaction on one store.
    ///
    /// Resolves once the store lock is available: read-only transactions
    /// share it, read-write transactions hold it exclusively.
    pub async fn transaction(&self, store: &str, mode: TransactionMode) -> StoreResult<Transaction> {
        let handle = self.store_handle(store)?;
        let guard = match mode {
            TransactionMode::ReadOnly => StoreGuard::Read(handle.read_owned().await),
            TransactionMode::ReadWrite => StoreGuard::write(handle.write_owned().await),
        };
        Ok(Transaction::new(store.to_string(), guard))
    }

    fn store_handle(&self, store: &str) -> StoreResult<Arc<StoreLock<ObjectStore>>> {
        self.read_catalog(|c| c.stores.get(store).map(|e| Arc::clone(&e.data)))
            .ok_or_else(|| StoreError::store_not_found(store))
    }

    fn read_catalog<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        let catalog = self
            .state
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&catalog)
    }
}

/// Version-change transaction handed to the upgrade-needed handler.
///
/// Store creations are staged and applied together by `commit`.
pub struct VersionChange {
    database: Database,
    old_version: u32,
    new_version: u32,
    created: BTreeMap<String, ObjectStore>,
}

impl VersionChange {
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn contains_store(&self, name: &str) -> bool {
        self.created.contains_key(name) || self.database.contains_store(name)
    }

    /// Creates a store with the given key path.
    ///
    /// Returns false and leaves the store untouched if it already exists.
    pub fn create_store(&mut self, name: &str, key_path: &str) -> bool {
        if self.contains_store(name) {
            return false;
        }
        self.created
            .insert(name.to_string(), ObjectStore::new(name, key_path));
        true
    }

    /// Creates a non-unique index on a store staged in this upgrade.
    ///
    /// Returns false if the index already exists.
    pub fn create_index(&mut self, store: &str, field: &str) -> StoreResult<bool> {
        self.created
            .get_mut(store)
            .map(|s| s.create_index(field))
            .ok_or_else(|| StoreError::store_not_found(store))
    }

    /// Applies the staged stores and the new version.
    ///
    /// Stores another upgrade already created are kept, and the version never
    /// moves backwards when two upgrades from the same old version race.
    pub fn commit(self) -> Database {
        {
            let mut catalog = self
                .database
                .state
                .catalog
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (name, store) in self.created {
                catalog.stores.entry(name).or_insert_with(|| StoreEntry {
                    key_path: store.key_path().to_string(),
                    indexes: store.index_names(),
                    data: Arc::new(StoreLock::new(store)),
                });
            }
            catalog.version = catalog.version.max(self.new_version);
        }
        self.database
    }
}

/// Result of an open request
pub enum OpenEvent {
    /// Database opened at its stored version
    Success(Database),
    /// Requested version is newer; the handler must commit the upgrade
    UpgradeNeeded(VersionChange),
    /// Open failed
    Error(StoreError),
}

/// In-process host of named, versioned databases.
#[derive(Debug, Default)]
pub struct Engine {
    databases: RwLock<HashMap<String, Database>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (creating if needed) a database.
    ///
    /// Without a version, an existing database opens at its version and a new
    /// one is created at version 1. Requesting a version below the stored one
    /// is an error.
    pub fn open(&self, name: &str, version: Option<u32>) -> OpenEvent {
        if version == Some(0) {
            return OpenEvent::Error(StoreError::connection(name, "version must be positive"));
        }

        let database = {
            let mut databases = self
                .databases
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            databases
                .entry(name.to_string())
                .or_insert_with(|| Database {
                    state: Arc::new(DatabaseState {
                        name: name.to_string(),
                        catalog: RwLock::new(Catalog::default()),
                    }),
                })
                .clone()
        };

        let current = database.version();
        let requested = version.unwrap_or(current.max(1));

        if requested < current {
            return OpenEvent::Error(StoreError::connection(
                name,
                format!(
                    "requested version {} is less than existing version {}",
                    requested, current
                ),
            ));
        }

        if requested > current {
            return OpenEvent::UpgradeNeeded(VersionChange {
                database,
                old_version: current,
                new_version: requested,
                created: BTreeMap::new(),
            });
        }

        OpenEvent::Success(database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Key, KeyRange};
    use serde_json::json;

    fn upgraded(engine: &Engine) -> Database {
        match engine.open("1389_db", Some(1)) {
            OpenEvent::UpgradeNeeded(mut change) => {
                assert_eq!(change.old_version(), 0);
                assert!(change.create_store("plan", "planid"));
                assert!(change.create_index("plan", "status").unwrap());
                change.commit()
            }
            _ => panic!("expected upgrade"),
        }
    }

    #[test]
    fn test_fresh_open_needs_upgrade() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        assert_eq!(db.version(), 1);
        assert!(db.contains_store("plan"));
        assert_eq!(db.index_names("plan").unwrap(), vec!["status".to_string()]);
    }

    #[test]
    fn test_same_version_opens_directly() {
        let engine = Engine::new();
        upgraded(&engine);

        assert!(matches!(engine.open("1389_db", Some(1)), OpenEvent::Success(_)));
        assert!(matches!(engine.open("1389_db", None), OpenEvent::Success(_)));
    }

    #[test]
    fn test_lower_version_is_error() {
        let engine = Engine::new();
        upgraded(&engine);
        if let OpenEvent::UpgradeNeeded(change) = engine.open("1389_db", Some(3)) {
            change.commit();
        }

        match engine.open("1389_db", Some(2)) {
            OpenEvent::Error(e) => assert_eq!(e.code(), "OFFSTORE_CONNECTION_FAILED"),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn test_create_store_is_idempotent() {
        let engine = Engine::new();
        upgraded(&engine);

        match engine.open("1389_db", Some(2)) {
            OpenEvent::UpgradeNeeded(mut change) => {
                assert!(!change.create_store("plan", "other"));
                assert!(change.create_store("unit", "unitid"));
                let db = change.commit();
                assert_eq!(db.store_names(), vec!["plan".to_string(), "unit".to_string()]);
            }
            _ => panic!("expected upgrade"),
        }
    }

    #[test]
    fn test_racing_upgrades_keep_highest_version() {
        let engine = Engine::new();
        upgraded(&engine);

        let (Some(mut low), Some(mut high)) = (
            upgrade_to(&engine, 2),
            upgrade_to(&engine, 3),
        ) else {
            panic!("expected two upgrades");
        };
        assert_eq!(low.old_version(), high.old_version());

        assert!(high.create_store("unit", "unitid"));
        assert!(low.create_store("unit", "other"));
        high.commit();
        let db = low.commit();

        assert_eq!(db.version(), 3);
        assert_eq!(db.key_path("unit").unwrap(), "unitid");
    }

    fn upgrade_to(engine: &Engine, version: u32) -> Option<VersionChange> {
        match engine.open("1389_db", Some(version)) {
            OpenEvent::UpgradeNeeded(change) => Some(change),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_unknown_store_transaction() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        let err = db
            .transaction("nope", TransactionMode::ReadOnly)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "OFFSTORE_STORE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_commit_applies_and_abort_rolls_back() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        let mut tx = db.transaction("plan", TransactionMode::ReadWrite).await.unwrap();
        tx.add(json!({"planid": 1, "status": "active"})).unwrap();
        tx.complete().await.unwrap();

        let mut tx = db.transaction("plan", TransactionMode::ReadWrite).await.unwrap();
        tx.add(json!({"planid": 2, "status": "active"})).unwrap();
        assert!(tx.add(json!({"planid": 1})).is_err());
        assert!(tx.abort_error().is_some());
        assert!(tx.complete().await.is_err());

        let tx = db.transaction("plan", TransactionMode::ReadOnly).await.unwrap();
        let one = Key::from_json(&json!(1)).unwrap();
        let two = Key::from_json(&json!(2)).unwrap();
        assert!(tx.get(&one).unwrap().is_some());
        assert!(tx.get(&two).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        let mut tx = db.transaction("plan", TransactionMode::ReadOnly).await.unwrap();
        assert!(tx.put(json!({"planid": 1})).is_err());
    }

    #[tokio::test]
    async fn test_cursor_delete_while_scanning() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        let mut tx = db.transaction("plan", TransactionMode::ReadWrite).await.unwrap();
        for i in 1..=3 {
            tx.add(json!({"planid": i, "status": "active"})).unwrap();
        }

        let range = KeyRange::only(Key::from_string("active"));
        let mut cursor = tx.open_cursor(Some("status"), &range).unwrap();
        let mut seen = Vec::new();
        while let Some(record) = cursor.next() {
            seen.push(record["planid"].clone());
            cursor.delete().unwrap();
        }
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
        tx.complete().await.unwrap();

        let mut tx = db.transaction("plan", TransactionMode::ReadOnly).await.unwrap();
        let left = tx.open_cursor(None, &KeyRange::Unbounded).unwrap().count();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn test_cursor_on_missing_index() {
        let engine = Engine::new();
        let db = upgraded(&engine);

        let mut tx = db.transaction("plan", TransactionMode::ReadOnly).await.unwrap();
        assert!(tx.open_cursor(Some("owner"), &KeyRange::Unbounded).is_err());
    }
}
