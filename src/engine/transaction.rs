//! Transactions and cursors
//!
//! A transaction holds its store's lock for its whole lifetime: read-only
//! transactions share it, read-write transactions hold it exclusively.
//! Writes apply to the store in place and record undo entries. An abort, or
//! a write transaction dropped before `complete`, replays them in reverse so
//! the store ends up as it was.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

use crate::completion::Completion;
use crate::errors::{AbortReason, StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};

use super::key::{Key, KeyRange};
use super::store::ObjectStore;

/// Transaction modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
        }
    }
}

/// Prior state of one record touched by a write
type UndoEntry = (Key, Option<Value>);

pub(crate) enum StoreGuard {
    Read(OwnedRwLockReadGuard<ObjectStore>),
    Write {
        guard: OwnedRwLockWriteGuard<ObjectStore>,
        undo: Vec<UndoEntry>,
    },
}

impl StoreGuard {
    pub(crate) fn write(guard: OwnedRwLockWriteGuard<ObjectStore>) -> Self {
        StoreGuard::Write {
            guard,
            undo: Vec::new(),
        }
    }
}

/// A transaction over a single object store.
pub struct Transaction {
    store_name: String,
    guard: StoreGuard,
    aborted: Option<StoreError>,
}

impl Transaction {
    pub(crate) fn new(store_name: String, guard: StoreGuard) -> Self {
        Self {
            store_name,
            guard,
            aborted: None,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn mode(&self) -> TransactionMode {
        match self.guard {
            StoreGuard::Read(_) => TransactionMode::ReadOnly,
            StoreGuard::Write { .. } => TransactionMode::ReadWrite,
        }
    }

    /// Returns the abort error if the transaction has aborted
    pub fn abort_error(&self) -> Option<&StoreError> {
        self.aborted.as_ref()
    }

    /// The store as seen by this transaction
    pub fn store(&self) -> &ObjectStore {
        match &self.guard {
            StoreGuard::Read(guard) => guard,
            StoreGuard::Write { guard, .. } => guard,
        }
    }

    pub fn key_path(&self) -> &str {
        self.store().key_path()
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.store().has_index(field)
    }

    /// Reads a record by primary key
    pub fn get(&self, primary: &Key) -> StoreResult<Option<Value>> {
        self.ensure_active()?;
        Ok(self.store().get(primary).cloned())
    }

    /// Adds a new record; a duplicate key aborts the transaction
    pub fn add(&mut self, record: Value) -> StoreResult<Key> {
        let outcome = self.writable().and_then(|(store, undo)| {
            let primary = store.add(record)?;
            undo.push((primary.clone(), None));
            Ok(primary)
        });
        self.track(outcome)
    }

    /// Inserts or replaces a record
    pub fn put(&mut self, record: Value) -> StoreResult<Key> {
        let outcome = self.writable().and_then(|(store, undo)| {
            let primary = store.primary_key_of(&record)?;
            let previous = store.get(&primary).cloned();
            store.put(record)?;
            undo.push((primary.clone(), previous));
            Ok(primary)
        });
        self.track(outcome)
    }

    /// Deletes a record by key, returning it if it existed
    pub fn delete(&mut self, primary: &Key) -> StoreResult<Option<Value>> {
        let outcome = self.writable().map(|(store, undo)| {
            let deleted = store.delete(primary);
            if let Some(record) = &deleted {
                undo.push((primary.clone(), Some(record.clone())));
            }
            deleted
        });
        self.track(outcome)
    }

    /// Opens a cursor over `index` restricted to `range`.
    ///
    /// Pass None to walk the primary key instead of an index.
    pub fn open_cursor(&mut self, index: Option<&str>, range: &KeyRange) -> StoreResult<Cursor<'_>> {
        self.ensure_active()?;
        if let Some(name) = index {
            if !self.store().has_index(name) {
                return Err(StoreError::schema_violation(self.store_name.clone(), name));
            }
        }

        Ok(Cursor {
            tx: self,
            index: index.map(str::to_string),
            range: range.clone(),
            position: None,
            yielded: HashSet::new(),
            current: None,
        })
    }

    /// Aborts the transaction with the given error.
    ///
    /// Writes made so far are rolled back immediately.
    pub fn abort(&mut self, error: StoreError) {
        if self.aborted.is_none() {
            let reason = error.to_string();
            log_event_with_fields(
                Event::TransactionAbort,
                &[("store", self.store_name.as_str()), ("reason", reason.as_str())],
            );
            self.aborted = Some(error);
            self.rollback();
        }
    }

    /// Finishes the transaction.
    ///
    /// Settles with `()` once a read-write transaction's changes are kept,
    /// or fails with the abort error; an abort never settles successfully.
    pub fn complete(mut self) -> Completion<()> {
        let outcome = match self.aborted.take() {
            Some(error) => {
                self.rollback();
                Err(error)
            }
            None => {
                if let StoreGuard::Write { undo, .. } = &mut self.guard {
                    undo.clear();
                }
                Ok(())
            }
        };

        match outcome {
            Ok(()) => Completion::ready(()),
            Err(error) => Completion::failed(error),
        }
    }

    fn rollback(&mut self) {
        if let StoreGuard::Write { guard, undo } = &mut self.guard {
            while let Some((primary, previous)) = undo.pop() {
                guard.restore(primary, previous);
            }
        }
    }

    fn ensure_active(&self) -> StoreResult<()> {
        match &self.aborted {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn writable(&mut self) -> StoreResult<(&mut ObjectStore, &mut Vec<UndoEntry>)> {
        self.ensure_active()?;
        match &mut self.guard {
            StoreGuard::Write { guard, undo } => Ok((&mut **guard, undo)),
            StoreGuard::Read(_) => Err(StoreError::aborted(
                self.store_name.clone(),
                AbortReason::ReadOnly,
                "mutation in a read-only transaction",
            )),
        }
    }

    fn track<T>(&mut self, outcome: StoreResult<T>) -> StoreResult<T> {
        if let Err(error) = &outcome {
            self.abort(error.clone());
        }
        outcome
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// Sequential cursor over the records matched by a key range.
///
/// Entries are produced one at a time in index order, resuming after the
/// last `(index key, primary key)` position, so deleting the current entry
/// is safe. A record is yielded at most once even if an update moves it
/// further along the index.
pub struct Cursor<'tx> {
    tx: &'tx mut Transaction,
    index: Option<String>,
    range: KeyRange,
    position: Option<(Key, Key)>,
    yielded: HashSet<Key>,
    current: Option<Key>,
}

impl Cursor<'_> {
    /// Primary key of the entry last yielded
    pub fn primary_key(&self) -> Option<&Key> {
        self.current.as_ref()
    }

    /// Deletes the entry last yielded
    pub fn delete(&mut self) -> StoreResult<Option<Value>> {
        match self.current.take() {
            Some(primary) => self.tx.delete(&primary),
            None => Ok(None),
        }
    }

    /// Replaces the entry last yielded.
    ///
    /// The record must keep the entry's primary key; changing it aborts the
    /// transaction with a data error.
    pub fn update(&mut self, record: Value) -> StoreResult<Key> {
        let primary = self.tx.store().primary_key_of(&record);
        let outcome = match (primary, &self.current) {
            (Ok(primary), Some(current)) if &primary == current => return self.tx.put(record),
            (Ok(primary), Some(current)) => Err(StoreError::aborted(
                self.tx.store_name.clone(),
                AbortReason::Data,
                format!("cursor update changes key {} to {}", current, primary),
            )),
            (Ok(_), None) => Err(StoreError::aborted(
                self.tx.store_name.clone(),
                AbortReason::Data,
                "cursor has no current entry",
            )),
            (Err(e), _) => Err(e),
        };
        self.tx.track(outcome)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.tx.aborted.is_some() {
            return None;
        }
        loop {
            let after = self.position.as_ref().map(|(key, primary)| (key, primary));
            let next = self
                .tx
                .store()
                .next_entry(self.index.as_deref(), &self.range, after);
            let Some((key, primary)) = next else {
                self.current = None;
                return None;
            };
            self.position = Some((key, primary.clone()));

            if !self.yielded.insert(primary.clone()) {
                continue;
            }
            if let Some(record) = self.tx.store().get(&primary) {
                let record = record.clone();
                self.current = Some(primary);
                return Some(record);
            }
        }
    }
}
