//! Staging tables for Arrow data.
//!
//! A [`StagedTable`] materializes Arrow batches into a uniquely named table so
//! they can be referenced from SQL (`CREATE TABLE ... AS`, `COPY`). The table
//! is dropped when the guard goes out of scope.

use duckdb::arrow::datatypes::Schema;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::WrapperError;
use crate::sql;
use crate::types::arrow_type_to_duckdb;

/// DuckDB's vector size; the appender is fed slices no larger than this.
const APPEND_CHUNK_ROWS: usize = 2048;

pub(crate) struct StagedTable<'conn> {
    conn: &'conn Connection,
    name: String,
    rows: usize,
}

impl<'conn> StagedTable<'conn> {
    /// Create the staging table for `schema` and append `batches` into it.
    #[instrument(skip_all, fields(columns = schema.fields().len()))]
    pub(crate) fn create(
        conn: &'conn Connection,
        schema: &Schema,
        batches: &[RecordBatch],
    ) -> Result<Self, WrapperError> {
        if schema.fields().is_empty() {
            return Err(WrapperError::EmptyInput);
        }

        let name = format!("__duckwrap_stage_{}", Uuid::new_v4().simple());
        conn.execute_batch(&staging_ddl(&name, schema)?)?;
        let mut staged = StagedTable {
            conn,
            name,
            rows: 0,
        };

        let mut appender = conn.appender(&staged.name)?;
        for batch in batches {
            let mut offset = 0;
            while offset < batch.num_rows() {
                let len = (batch.num_rows() - offset).min(APPEND_CHUNK_ROWS);
                appender.append_record_batch(batch.slice(offset, len))?;
                offset += len;
            }
            staged.rows += batch.num_rows();
        }
        appender.flush()?;
        drop(appender);

        debug!(table = %staged.name, rows = staged.rows, "staged batches");
        Ok(staged)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }
}

impl Drop for StagedTable<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.execute_batch(&sql::drop_table(&self.name)) {
            warn!(table = %self.name, error = %err, "failed to drop staging table");
        }
    }
}

fn staging_ddl(name: &str, schema: &Schema) -> Result<String, WrapperError> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        columns.push(format!(
            "{} {}",
            sql::quote_identifier(field.name()),
            arrow_type_to_duckdb(field.data_type())?
        ));
    }
    Ok(format!("CREATE TABLE {name} ({})", columns.join(", ")))
}
