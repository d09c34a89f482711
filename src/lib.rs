//! offstore - An embedded, per-user partitioned document store
//!
//! Selector queries over indexed stores, explicit mutations, and a
//! single-resolution completion pipeline tying open, transact and scan
//! together.

pub mod completion;
pub mod config;
pub mod connection;
pub mod engine;
pub mod errors;
pub mod levels;
pub mod mutation;
pub mod observability;
pub mod query;
pub mod schema;

pub use completion::{Completion, Resolver, Step};
pub use config::StoreConfig;
pub use connection::{CallParams, Connection, ConnectionManager, Context, OpenOptions};
pub use errors::{StoreError, StoreResult};
pub use levels::{Found, LevelStore};
pub use mutation::{MutationExecutor, RemoveTarget, Removed, Updated, WriteRequest};
pub use query::{Lookup, QueryExecutor, Selector};
pub use schema::{SchemaCatalog, StoreDef};
