//! Selector queries
//!
//! - `Selector` parses the ordered field conditions of a query
//! - `RangeTranslator` turns the first field's condition into a key range
//! - `QueryExecutor` scans that field's index over the range
//! - `SecondaryFilter` applies the remaining predicates and the projection

mod executor;
mod filter;
mod range;
mod selector;

pub use executor::{CursorEntry, QueryExecutor, ScanControl};
pub use filter::SecondaryFilter;
pub use range::RangeTranslator;
pub use selector::{Condition, Lookup, Operator, Predicate, Selector};
