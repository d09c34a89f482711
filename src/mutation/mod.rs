//! Inserts, updates and removes
//!
//! Mutations take explicit requests (`WriteRequest`, `RemoveTarget`) rather
//! than inferring intent from the shape of their input.

mod executor;
mod request;

pub use executor::MutationExecutor;
pub use request::{normalize, RemoveTarget, Removed, Updated, WriteRequest};
