//! Indexed storage engine for offstore
//!
//! In-process host of the storage primitive the query and mutation layers
//! build on: named versioned databases, object stores keyed by a key path,
//! non-unique secondary indexes, transactions and cursors.
//!
//! # Invariants
//!
//! - Stores and indexes are created only by a version change
//! - Transactions cover one store; writers are exclusive per store
//! - A write transaction applies all of its changes or none of them
//! - Cursors walk index order; ties break by primary key ascending

mod database;
mod index;
mod key;
mod store;
mod transaction;

pub use database::{Database, Engine, OpenEvent, VersionChange};
pub use index::IndexTree;
pub use key::{Direction, Key, KeyRange};
pub use store::ObjectStore;
pub use transaction::{Cursor, Transaction, TransactionMode};
