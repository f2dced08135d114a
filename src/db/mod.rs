//! Database module for the legacy store
//!
//! Provides connection pool management and the read-only record source the
//! exporters query through.

pub mod pool;
pub mod row;
pub mod source;

#[cfg(test)]
pub(crate) mod memory;

pub use pool::{DbPool, SourceError};
pub use row::Row;
pub use source::{PgRecordSource, Query, RecordSource, SqlParam};
