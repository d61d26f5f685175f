//! SQL text builders.
//!
//! Caller-supplied fragments (column names, filter predicates, table names,
//! paths) are interpolated verbatim. Only identifiers and literals the wrapper
//! generates itself go through [`quote_identifier`] / [`quote_literal`].

use std::fmt;

use crate::error::WrapperError;
use crate::storage::AwsCredentials;

/// Tabular file formats the engine can read directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv,
}

impl FileFormat {
    /// Pick the reader from a path or glob by case-insensitive substring match.
    ///
    /// `parquet` wins over `csv` when both appear.
    pub fn detect(path: &str) -> Result<Self, WrapperError> {
        let lowered = path.to_lowercase();
        if lowered.contains("parquet") {
            Ok(FileFormat::Parquet)
        } else if lowered.contains("csv") {
            Ok(FileFormat::Csv)
        } else {
            Err(WrapperError::UnsupportedFileType(path.to_string()))
        }
    }

    /// DuckDB table function reading this format.
    pub fn reader(self) -> &'static str {
        match self {
            FileFormat::Parquet => "read_parquet",
            FileFormat::Csv => "read_csv",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Parquet => write!(f, "parquet"),
            FileFormat::Csv => write!(f, "csv"),
        }
    }
}

/// `SELECT <columns|*> FROM read_<fmt>('<path>') [WHERE (p1) AND (p2) ...]`
pub fn read_file_query(
    path: &str,
    format: FileFormat,
    columns: &[String],
    filters: &[String],
) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };
    let mut sql = format!("SELECT {projection} FROM {}('{path}')", format.reader());
    if !filters.is_empty() {
        let conditions = filters
            .iter()
            .map(|condition| format!("({condition})"))
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    sql
}

pub fn create_table_as(table: &str, source: &str) -> String {
    format!("CREATE TABLE {table} AS SELECT * FROM {source}")
}

pub fn select_all(relation: &str) -> String {
    format!("SELECT * FROM {relation}")
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

/// `COPY (<source>) TO '<path>' (FORMAT PARQUET)`
pub fn copy_to_parquet(source_query: &str, path: &str) -> String {
    format!("COPY ({source_query}) TO '{path}' (FORMAT PARQUET)")
}

/// `INSTALL`/`LOAD` batch for the given extensions.
pub fn install_and_load(extensions: &[String]) -> String {
    let mut statements = Vec::with_capacity(extensions.len() * 2);
    for ext in extensions {
        statements.push(format!("INSTALL {ext};"));
    }
    for ext in extensions {
        statements.push(format!("LOAD {ext};"));
    }
    statements.join(" ")
}

/// Session-scoped S3 secret. `OR REPLACE` lets the registration be repeated.
pub fn create_s3_secret(name: &str, credentials: &AwsCredentials) -> String {
    let mut options = vec![
        "TYPE S3".to_string(),
        format!("KEY_ID {}", quote_literal(&credentials.access_key_id)),
        format!("SECRET {}", quote_literal(&credentials.secret_access_key)),
    ];
    if let Some(token) = credentials.session_token.as_deref() {
        options.push(format!("SESSION_TOKEN {}", quote_literal(token)));
    }
    if let Some(region) = credentials.region.as_deref() {
        options.push(format!("REGION {}", quote_literal(region)));
    }
    format!("CREATE OR REPLACE SECRET {name} ({})", options.join(", "))
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
