//! Lazily evaluated query results.

use std::collections::VecDeque;

use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::{params_from_iter, Connection, Statement};
use tracing::debug;

use crate::engine::params::Params;
use crate::error::WrapperError;
use crate::record::Record;
use crate::types::batch_to_records;

/// How chunks are pulled from the executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// Executed with DuckDB's streaming API; each chunk is computed on demand.
    Streaming,
    /// The engine materialized the whole result up front.
    Materialized,
}

/// Forward-only row cursor over an executed statement.
///
/// Queries run through DuckDB's streaming execution, so the engine produces
/// one chunk (up to 2048 rows) each time the buffered rows run out. Statements
/// that cannot be wrapped in a subquery, such as `PRAGMA` or `INSERT ...
/// RETURNING`, are materialized by the engine first and then handed out chunk
/// by chunk.
///
/// The stream cannot be restarted; issue the query again instead. It holds the
/// wrapper's connection borrowed for its whole lifetime, so only one stream
/// (or other operation) can be active per wrapper.
pub struct RowStream<'conn> {
    stmt: Statement<'conn>,
    schema: SchemaRef,
    mode: FetchMode,
    pending: VecDeque<Record>,
    exhausted: bool,
    yielded: usize,
}

impl<'conn> RowStream<'conn> {
    pub(crate) fn start(
        conn: &'conn Connection,
        sql: &str,
        params: Params<'_>,
    ) -> Result<Self, WrapperError> {
        let mut stmt = conn.prepare(sql)?;
        let ordered = params.bind_order(&stmt)?;

        let (schema, mode) = match result_schema(conn, sql, params)? {
            Some(schema) => {
                stmt.stream_arrow(params_from_iter(ordered), schema.clone())?;
                (schema, FetchMode::Streaming)
            }
            None => {
                debug!("statement cannot be wrapped, materializing before streaming");
                stmt.execute(params_from_iter(ordered))?;
                (stmt.schema(), FetchMode::Materialized)
            }
        };

        Ok(Self {
            stmt,
            schema,
            mode,
            pending: VecDeque::new(),
            exhausted: false,
            yielded: 0,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    /// Number of rows handed out so far.
    pub fn rows_yielded(&self) -> usize {
        self.yielded
    }

    /// Whether the engine computes chunks on demand rather than up front.
    pub fn is_streaming(&self) -> bool {
        self.mode == FetchMode::Streaming
    }

    fn fill(&mut self) -> Result<bool, WrapperError> {
        while self.pending.is_empty() {
            let chunk = match self.mode {
                FetchMode::Streaming => self.stmt.stream_step(self.schema.clone()),
                FetchMode::Materialized => self.stmt.step(),
            };
            let Some(chunk) = chunk else {
                self.exhausted = true;
                debug!(rows = self.yielded, "row stream exhausted");
                return Ok(false);
            };
            let batch = RecordBatch::from(&chunk);
            self.pending.extend(batch_to_records(&batch)?);
        }
        Ok(true)
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Record, WrapperError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            if self.exhausted {
                return None;
            }
            match self.fill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
        let record = self.pending.pop_front()?;
        self.yielded += 1;
        Some(Ok(record))
    }
}

/// Result schema of `sql`, taken from an empty run of the query.
///
/// Streaming execution needs the Arrow schema before the first chunk. Returns
/// `None` when the statement cannot be used as a subquery.
fn result_schema(
    conn: &Connection,
    sql: &str,
    params: Params<'_>,
) -> Result<Option<SchemaRef>, WrapperError> {
    let body = sql.trim().trim_end_matches(';');
    let Ok(mut stmt) = conn.prepare(&format!("SELECT * FROM (\n{body}\n) LIMIT 0")) else {
        return Ok(None);
    };
    let ordered = params.bind_order(&stmt)?;
    let arrow = stmt.query_arrow(params_from_iter(ordered))?;
    Ok(Some(arrow.get_schema()))
}
