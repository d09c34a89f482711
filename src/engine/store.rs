//! Object store: records keyed by a key path, plus secondary indexes

use std::collections::BTreeMap;
use std::ops::Bound;

use serde_json::Value;

use crate::errors::{AbortReason, StoreError, StoreResult};

use super::index::IndexTree;
use super::key::{Key, KeyRange};

/// A named partition of records.
///
/// Every record is a JSON object carrying its primary key under `key_path`.
/// Each index is named after the field it indexes.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    name: String,
    key_path: String,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexTree>,
}

impl ObjectStore {
    /// Creates an empty store
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Creates an index over `field`, populated from existing records.
    ///
    /// Returns false if the index already exists.
    pub fn create_index(&mut self, field: &str) -> bool {
        if self.indexes.contains_key(field) {
            return false;
        }

        let mut tree = IndexTree::new();
        for (primary, record) in &self.records {
            if let Some(key) = record.get(field).and_then(Key::from_json) {
                tree.insert(key, primary.clone());
            }
        }
        self.indexes.insert(field.to_string(), tree);
        true
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Extracts the primary key of a record
    pub fn primary_key_of(&self, record: &Value) -> StoreResult<Key> {
        if !record.is_object() {
            return Err(StoreError::aborted(
                &self.name,
                AbortReason::Data,
                "record is not an object",
            ));
        }
        record
            .get(&self.key_path)
            .and_then(Key::from_json)
            .ok_or_else(|| {
                StoreError::aborted(
                    &self.name,
                    AbortReason::Data,
                    format!("record has no valid '{}' key", self.key_path),
                )
            })
    }

    /// Inserts a new record; fails if its key already exists
    pub fn add(&mut self, record: Value) -> StoreResult<Key> {
        let primary = self.primary_key_of(&record)?;
        if self.records.contains_key(&primary) {
            return Err(StoreError::aborted(
                &self.name,
                AbortReason::Constraint,
                format!("key {} already exists", primary),
            ));
        }
        self.index_record(&primary, &record);
        self.records.insert(primary.clone(), record);
        Ok(primary)
    }

    /// Inserts or replaces a record
    pub fn put(&mut self, record: Value) -> StoreResult<Key> {
        let primary = self.primary_key_of(&record)?;
        self.delete(&primary);
        self.index_record(&primary, &record);
        self.records.insert(primary.clone(), record);
        Ok(primary)
    }

    pub fn get(&self, primary: &Key) -> Option<&Value> {
        self.records.get(primary)
    }

    /// Removes a record, returning it if present
    pub fn delete(&mut self, primary: &Key) -> Option<Value> {
        let record = self.records.remove(primary)?;
        for (field, tree) in self.indexes.iter_mut() {
            if let Some(key) = record.get(field).and_then(Key::from_json) {
                tree.remove(&key, primary);
            }
        }
        Some(record)
    }

    /// Next `(index key, primary key)` entry of a walk over `index`, or over
    /// the primary key when `index` is None, restricted to `range` and
    /// resuming after `after`.
    ///
    /// Returns None once the walk is exhausted or the index does not exist.
    pub fn next_entry(
        &self,
        index: Option<&str>,
        range: &KeyRange,
        after: Option<(&Key, &Key)>,
    ) -> Option<(Key, Key)> {
        match index {
            Some(name) => self.indexes.get(name)?.next_after(range, after),
            None => {
                let (lower, upper) = range.as_bounds();
                let lower = match after {
                    Some((primary, _)) => Bound::Excluded(primary.clone()),
                    None => lower,
                };
                self.records
                    .range((lower, upper))
                    .next()
                    .map(|(primary, _)| (primary.clone(), primary.clone()))
            }
        }
    }

    /// Puts back the state a record had before a write: `previous` is the
    /// record stored under `primary`, or None if there was none.
    pub(crate) fn restore(&mut self, primary: Key, previous: Option<Value>) {
        self.delete(&primary);
        if let Some(record) = previous {
            self.index_record(&primary, &record);
            self.records.insert(primary, record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index_record(&mut self, primary: &Key, record: &Value) {
        for (field, tree) in self.indexes.iter_mut() {
            if let Some(key) = record.get(field).and_then(Key::from_json) {
                tree.insert(key, primary.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn walk(store: &ObjectStore, index: Option<&str>, range: &KeyRange) -> Vec<Key> {
        let mut out = Vec::new();
        let mut position: Option<(Key, Key)> = None;
        while let Some(next) = store.next_entry(index, range, position.as_ref().map(|(k, p)| (k, p))) {
            out.push(next.1.clone());
            position = Some(next);
        }
        out
    }

    fn plan_store() -> ObjectStore {
        let mut store = ObjectStore::new("plan", "planid");
        store.create_index("status");
        store
    }

    #[test]
    fn test_add_and_get() {
        let mut store = plan_store();
        let key = store.add(json!({"planid": 1, "status": "active"})).unwrap();

        assert_eq!(store.get(&key), Some(&json!({"planid": 1, "status": "active"})));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_duplicate_is_constraint_error() {
        let mut store = plan_store();
        store.add(json!({"planid": 1})).unwrap();

        let err = store.add(json!({"planid": 1})).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transaction {
                reason: AbortReason::Constraint,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_key_is_data_error() {
        let mut store = plan_store();
        let err = store.add(json!({"status": "active"})).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transaction {
                reason: AbortReason::Data,
                ..
            }
        ));
    }

    #[test]
    fn test_put_reindexes() {
        let mut store = plan_store();
        store.add(json!({"planid": 1, "status": "active"})).unwrap();
        store.put(json!({"planid": 1, "status": "paused"})).unwrap();

        let active = KeyRange::only(Key::from_string("active"));
        let paused = KeyRange::only(Key::from_string("paused"));
        assert!(walk(&store, Some("status"), &active).is_empty());
        assert_eq!(walk(&store, Some("status"), &paused).len(), 1);
    }

    #[test]
    fn test_create_index_backfills() {
        let mut store = ObjectStore::new("unit", "unitid");
        store.add(json!({"unitid": "a", "price": 3})).unwrap();
        store.add(json!({"unitid": "b"})).unwrap();

        assert!(store.create_index("price"));
        assert!(!store.create_index("price"));
        assert_eq!(
            walk(&store, Some("price"), &KeyRange::Unbounded),
            vec![Key::from_string("a")]
        );
    }

    #[test]
    fn test_delete_unindexes() {
        let mut store = plan_store();
        let key = store.add(json!({"planid": 7, "status": "active"})).unwrap();

        assert!(store.delete(&key).is_some());
        assert!(store.delete(&key).is_none());
        assert!(walk(&store, Some("status"), &KeyRange::Unbounded).is_empty());
    }

    #[test]
    fn test_primary_walk_resumes_after_deleted_key() {
        let mut store = plan_store();
        for id in 1..=3 {
            store.add(json!({"planid": id, "status": "active"})).unwrap();
        }
        let one = Key::from_json(&json!(1)).unwrap();
        let two = Key::from_json(&json!(2)).unwrap();
        store.delete(&two);

        assert_eq!(
            store.next_entry(None, &KeyRange::Unbounded, Some((&two, &two))),
            Some((Key::from_json(&json!(3)).unwrap(), Key::from_json(&json!(3)).unwrap()))
        );
        assert_eq!(walk(&store, None, &KeyRange::Unbounded).first(), Some(&one));
        assert_eq!(store.next_entry(Some("missing"), &KeyRange::Unbounded, None), None);
    }

    #[test]
    fn test_restore_undoes_put_and_delete() {
        let mut store = plan_store();
        let key = store.add(json!({"planid": 1, "status": "active"})).unwrap();

        store.put(json!({"planid": 1, "status": "paused"})).unwrap();
        store.restore(key.clone(), Some(json!({"planid": 1, "status": "active"})));
        assert_eq!(store.get(&key), Some(&json!({"planid": 1, "status": "active"})));
        assert!(walk(&store, Some("status"), &KeyRange::only(Key::from_string("paused"))).is_empty());

        store.restore(key.clone(), None);
        assert!(store.is_empty());
        assert!(walk(&store, Some("status"), &KeyRange::Unbounded).is_empty());
    }
}
