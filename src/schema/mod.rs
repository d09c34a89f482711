//! Store declarations for offstore
//!
//! A database's schema is an ordered catalog of stores. Each store has a
//! fixed key path and zero or more non-unique secondary indexes, each on the
//! field of the same name. Stores are created by a version upgrade and never
//! altered afterwards.

mod catalog;
mod types;

pub use catalog::{SchemaCatalog, DEFAULT_LEVELS};
pub use types::StoreDef;
