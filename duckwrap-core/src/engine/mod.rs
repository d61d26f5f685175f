//! DuckDB engine module - connection lifecycle and query execution.
//!
//! This module provides:
//! - `DuckDbWrapper`: owner of one connection and the pass-through operations
//! - `QueryResult`: materialized query results
//! - `RowStream`: lazily converted query results

mod batch;
pub mod connection;
mod factory;
mod params;
pub mod stream;

pub use connection::{ConnectionStatus, DuckDbWrapper, ExportSource, QueryResult, ReadOptions};
pub use stream::RowStream;
