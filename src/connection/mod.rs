//! Connections and per-call contexts
//!
//! - `ConnectionManager` opens a user's database and upgrades its schema
//! - `Context` carries one call's target store and result options

mod context;
mod manager;

pub use context::{CallParams, Context};
pub use manager::{ConnectionManager, OpenOptions};

/// An open database handle
pub type Connection = crate::engine::Database;
