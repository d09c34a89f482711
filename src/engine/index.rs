//! BTreeMap-based secondary index
//!
//! Maps an indexed field value to the primary keys of the records carrying it.
//! Scans walk index keys ascending; ties resolve by primary key ascending.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use super::key::{Key, KeyRange};

/// A single non-unique field index.
#[derive(Debug, Clone, Default)]
pub struct IndexTree {
    tree: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexTree {
    /// Creates a new empty index tree
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Insert a primary key under an index key
    pub fn insert(&mut self, key: Key, primary: Key) {
        self.tree.entry(key).or_default().insert(primary);
    }

    /// Remove a primary key from an index key.
    ///
    /// If the index key has no more entries, it is removed entirely.
    pub fn remove(&mut self, key: &Key, primary: &Key) {
        if let Some(primaries) = self.tree.get_mut(key) {
            primaries.remove(primary);
            if primaries.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    /// First `(index key, primary key)` entry in `range` that sorts after
    /// `after`, or the first entry of the range when `after` is None.
    ///
    /// `after` need not still be present, so a walk survives deletions of
    /// the entry it last returned.
    pub fn next_after(&self, range: &KeyRange, after: Option<(&Key, &Key)>) -> Option<(Key, Key)> {
        let (lower, upper) = range.as_bounds();
        let lower = match after {
            Some((key, _)) => Bound::Included(key.clone()),
            None => lower,
        };

        self.tree.range((lower, upper)).find_map(|(key, primaries)| {
            let next = match after {
                Some((last, primary)) if key == last => primaries
                    .range((Bound::Excluded(primary), Bound::Unbounded))
                    .next(),
                _ => primaries.iter().next(),
            };
            next.map(|primary| (key.clone(), primary.clone()))
        })
    }
}
