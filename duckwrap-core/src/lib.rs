//! A thin convenience layer over an embedded DuckDB connection with S3 and
//! Parquet/CSV helpers.

pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod sql;
pub mod storage;
pub mod types;

pub use config::WrapperConfig;
pub use duckdb::types::Value;
pub use engine::{
    ConnectionStatus, DuckDbWrapper, ExportSource, QueryResult, ReadOptions, RowStream,
};
pub use error::{ErrorKind, WrapperError};
pub use record::{records_from_json, Record};
pub use sql::FileFormat;
