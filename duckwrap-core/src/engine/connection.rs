//! The connection manager.
//!
//! [`DuckDbWrapper`] exclusively owns one DuckDB connection and its lifecycle
//! (`Unopened -> Open -> Closed`). Every data operation forwards SQL text to
//! that connection.
//!
//! # SQL interpolation
//!
//! Table names, column lists, filter predicates and file paths passed to the
//! wrapper are interpolated into SQL text verbatim. Nothing is escaped or
//! validated; callers must only pass trusted, syntactically valid fragments.
//! Use positional parameters in [`DuckDbWrapper::execute_query`], or `$name`
//! parameters in [`DuckDbWrapper::execute_query_named`], for values.

use std::sync::Arc;

use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::types::Value;
use duckdb::{params_from_iter, Connection};
use tracing::{debug, info, instrument, warn};

use crate::config::WrapperConfig;
use crate::engine::batch::StagedTable;
use crate::engine::factory::open_connection;
use crate::engine::params::Params;
use crate::engine::stream::RowStream;
use crate::error::WrapperError;
use crate::record::Record;
use crate::sql::{self, FileFormat};
use crate::storage::{provider_from_config, CredentialProvider};
use crate::types::{batch_to_records, records_to_batch};

/// Materialized query result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub total_rows: usize,
}

impl QueryResult {
    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.total_rows
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    /// Rows as records, in result order.
    pub fn records(&self) -> Result<Vec<Record>, WrapperError> {
        let mut rows = Vec::with_capacity(self.total_rows);
        for batch in &self.batches {
            rows.extend(batch_to_records(batch)?);
        }
        Ok(rows)
    }
}

/// Optional projection, filters and format for [`DuckDbWrapper::read_file`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub columns: Vec<String>,
    pub filters: Vec<String>,
    /// Overrides detection from the path.
    pub format: Option<FileFormat>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a raw boolean predicate; all predicates are ANDed.
    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filters.push(predicate.into());
        self
    }

    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// What [`DuckDbWrapper::save_as_parquet`] writes out.
#[derive(Debug, Clone, Copy)]
pub enum ExportSource<'a> {
    /// A previously materialized result.
    Result(&'a QueryResult),
    /// An existing table, interpolated verbatim.
    Table(&'a str),
    /// In-memory records, staged for the duration of the copy.
    Records(&'a [Record]),
}

impl<'a> From<&'a QueryResult> for ExportSource<'a> {
    fn from(result: &'a QueryResult) -> Self {
        ExportSource::Result(result)
    }
}

impl<'a> From<&'a str> for ExportSource<'a> {
    fn from(table: &'a str) -> Self {
        ExportSource::Table(table)
    }
}

impl<'a> From<&'a [Record]> for ExportSource<'a> {
    fn from(records: &'a [Record]) -> Self {
        ExportSource::Records(records)
    }
}

impl<'a> From<&'a Vec<Record>> for ExportSource<'a> {
    fn from(records: &'a Vec<Record>) -> Self {
        ExportSource::Records(records.as_slice())
    }
}

/// Public view of the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unopened,
    Open,
    Closed,
}

enum ConnectionState {
    Unopened,
    Open(Connection),
    Closed,
}

/// Owner of a single DuckDB connection.
///
/// Operations require an open connection and fail with
/// [`WrapperError::NotConnected`] otherwise. With `lazy_open` set in the
/// configuration, the first operation opens an unopened wrapper. A closed
/// wrapper is never reopened. The connection is closed on drop.
pub struct DuckDbWrapper {
    config: WrapperConfig,
    credentials: Arc<dyn CredentialProvider>,
    state: ConnectionState,
}

impl DuckDbWrapper {
    pub fn new(config: WrapperConfig) -> Self {
        let credentials = provider_from_config(&config);
        Self {
            config,
            credentials,
            state: ConnectionState::Unopened,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(WrapperConfig::default())
    }

    /// Wrapper for a database file; DuckDB creates it on open if absent.
    pub fn with_file(path: impl Into<String>) -> Self {
        Self::new(WrapperConfig::with_database_path(path))
    }

    /// Construct and open in one step.
    pub fn connect(config: WrapperConfig) -> Result<Self, WrapperError> {
        let mut wrapper = Self::new(config);
        wrapper.open()?;
        Ok(wrapper)
    }

    /// Replace the credential source used by [`enable_remote_storage`](Self::enable_remote_storage).
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ConnectionState::Unopened => ConnectionStatus::Unopened,
            ConnectionState::Open(_) => ConnectionStatus::Open,
            ConnectionState::Closed => ConnectionStatus::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open(_))
    }

    /// Open the connection. Opening twice is a no-op; opening after
    /// [`close`](Self::close) fails with `NotConnected`.
    #[instrument(skip(self), fields(database = self.config.database_path.as_deref().unwrap_or(":memory:")))]
    pub fn open(&mut self) -> Result<(), WrapperError> {
        match self.state {
            ConnectionState::Open(_) => Ok(()),
            ConnectionState::Closed => Err(WrapperError::NotConnected),
            ConnectionState::Unopened => {
                let conn = open_connection(&self.config)?;
                self.state = ConnectionState::Open(conn);
                info!("connection opened");
                Ok(())
            }
        }
    }

    /// Release the connection. Idempotent; the wrapper stays closed.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), WrapperError> {
        if let ConnectionState::Open(conn) =
            std::mem::replace(&mut self.state, ConnectionState::Closed)
        {
            conn.close().map_err(|(_, err)| WrapperError::DuckDb(err))?;
            info!("connection closed");
        }
        Ok(())
    }

    /// Install the configured storage extensions and register credentials
    /// from the provider as a session-scoped S3 secret.
    ///
    /// Credentials are resolved on every call, so calling this again refreshes
    /// expiring session tokens.
    #[instrument(skip(self))]
    pub fn enable_remote_storage(&mut self) -> Result<(), WrapperError> {
        self.connection()?;
        let credentials = self.credentials.resolve()?;
        let extensions = self.config.storage_extensions();
        let secret_sql = sql::create_s3_secret(&self.config.s3_secret_name, &credentials);
        let secret_name = self.config.s3_secret_name.clone();

        let conn = self.connection()?;
        if !extensions.is_empty() {
            let install = sql::install_and_load(&extensions);
            debug!(sql = %install, "loading storage extensions");
            conn.execute_batch(&install)?;
        }
        conn.execute_batch(&secret_sql)?;

        info!(
            secret = %secret_name,
            extensions = ?extensions,
            region = ?credentials.region,
            "remote storage enabled"
        );
        Ok(())
    }

    /// Read Parquet or CSV file(s) at `path`, which may be a glob or remote URL.
    ///
    /// The format comes from `options.format` or from a case-insensitive
    /// `parquet`/`csv` substring in the path. The path, column names and filter
    /// predicates are interpolated into SQL without escaping.
    #[instrument(skip(self, options))]
    pub fn read_file(
        &mut self,
        path: &str,
        options: &ReadOptions,
    ) -> Result<QueryResult, WrapperError> {
        self.connection()?;
        let format = match options.format {
            Some(format) => format,
            None => FileFormat::detect(path)?,
        };
        let query = sql::read_file_query(path, format, &options.columns, &options.filters);
        debug!(sql = %query, %format, "reading file");
        self.run_query(&query, Params::Positional(&[]))
    }

    /// Create table `name` from records.
    ///
    /// Columns are the union of the records' fields; see
    /// [`records_to_batch`](crate::types::records_to_batch) for type
    /// inference. `name` is interpolated without quoting.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn create_table(&mut self, name: &str, records: &[Record]) -> Result<(), WrapperError> {
        let conn = self.connection()?;
        let batch = records_to_batch(records)?;
        let staged = StagedTable::create(conn, &batch.schema(), std::slice::from_ref(&batch))?;
        conn.execute_batch(&sql::create_table_as(name, staged.name()))?;
        info!(table = name, rows = staged.rows(), "table created");
        Ok(())
    }

    /// Run `sql` with positional `?` parameters and materialize the result.
    ///
    /// The parameter count is checked against the prepared statement before
    /// execution and a mismatch fails with `ParameterMismatch`.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub fn execute_query(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult, WrapperError> {
        self.run_query(sql, Params::Positional(params))
    }

    /// Run `sql` with `$name` parameters and materialize the result.
    ///
    /// Names may be given with or without the leading `$`. Unknown, repeated
    /// or missing names fail with an error of kind `ParameterMismatch` before
    /// execution.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub fn execute_query_named(
        &mut self,
        sql: &str,
        params: &[(&str, Value)],
    ) -> Result<QueryResult, WrapperError> {
        self.run_query(sql, Params::Named(params))
    }

    /// Like [`execute_query`](Self::execute_query) but yields rows lazily.
    ///
    /// The stream mutably borrows the wrapper until it is dropped.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub fn execute_query_streamed(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<RowStream<'_>, WrapperError> {
        self.stream_query(sql, Params::Positional(params))
    }

    /// Like [`execute_query_named`](Self::execute_query_named) but yields rows
    /// lazily.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub fn execute_query_streamed_named(
        &mut self,
        sql: &str,
        params: &[(&str, Value)],
    ) -> Result<RowStream<'_>, WrapperError> {
        self.stream_query(sql, Params::Named(params))
    }

    /// Run one or more statements for their side effects.
    #[instrument(skip(self))]
    pub fn execute_statement(&mut self, sql: &str) -> Result<(), WrapperError> {
        self.connection()?.execute_batch(sql)?;
        debug!("executed statement");
        Ok(())
    }

    /// `DROP TABLE IF EXISTS <name>`; `name` is interpolated without quoting.
    #[instrument(skip(self))]
    pub fn drop_table(&mut self, name: &str) -> Result<(), WrapperError> {
        self.connection()?.execute_batch(&sql::drop_table(name))?;
        info!(table = name, "table dropped");
        Ok(())
    }

    /// Write `source` to `path` as a Parquet file.
    ///
    /// Results and records are staged in a temporary table that is dropped
    /// after the copy. `path` and table names are interpolated without
    /// escaping; remote paths need [`enable_remote_storage`](Self::enable_remote_storage).
    #[instrument(skip(self, source))]
    pub fn save_as_parquet<'a>(
        &mut self,
        source: impl Into<ExportSource<'a>>,
        path: &str,
    ) -> Result<(), WrapperError> {
        let conn = self.connection()?;
        let rows = match source.into() {
            ExportSource::Table(table) => {
                conn.execute_batch(&sql::copy_to_parquet(&sql::select_all(table), path))?;
                None
            }
            ExportSource::Result(result) => {
                let staged = StagedTable::create(conn, &result.schema, &result.batches)?;
                copy_staged(conn, &staged, path)?;
                Some(staged.rows())
            }
            ExportSource::Records(records) => {
                let batch = records_to_batch(records)?;
                let staged =
                    StagedTable::create(conn, &batch.schema(), std::slice::from_ref(&batch))?;
                copy_staged(conn, &staged, path)?;
                Some(staged.rows())
            }
        };
        info!(path, rows = ?rows, "saved parquet");
        Ok(())
    }

    /// Save `table` as `<dir>/<file_name>.parquet` and return that path.
    ///
    /// Joined with `/` so remote prefixes such as `s3://bucket/dir` work.
    pub fn save_table_to_directory(
        &mut self,
        table: &str,
        dir: &str,
        file_name: &str,
    ) -> Result<String, WrapperError> {
        let path = format!("{}/{file_name}.parquet", dir.trim_end_matches('/'));
        self.save_as_parquet(ExportSource::Table(table), &path)?;
        Ok(path)
    }

    fn run_query(&mut self, sql: &str, params: Params<'_>) -> Result<QueryResult, WrapperError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let ordered = params.bind_order(&stmt)?;
        let arrow = stmt.query_arrow(params_from_iter(ordered))?;
        let schema = arrow.get_schema();

        let mut total_rows = 0usize;
        let batches: Vec<RecordBatch> = arrow
            .inspect(|batch| total_rows += batch.num_rows())
            .collect();

        debug!(batch_count = batches.len(), total_rows, "executed query");
        Ok(QueryResult {
            schema,
            batches,
            total_rows,
        })
    }

    fn stream_query(&mut self, sql: &str, params: Params<'_>) -> Result<RowStream<'_>, WrapperError> {
        let conn = self.connection()?;
        debug!(sql = %sql, "streaming query");
        let stream = RowStream::start(conn, sql, params)?;
        debug!(streaming = stream.is_streaming(), "row stream started");
        Ok(stream)
    }

    fn connection(&mut self) -> Result<&Connection, WrapperError> {
        if matches!(self.state, ConnectionState::Unopened) && self.config.lazy_open {
            self.open()?;
        }
        match &self.state {
            ConnectionState::Open(conn) => Ok(conn),
            _ => Err(WrapperError::NotConnected),
        }
    }
}

impl Drop for DuckDbWrapper {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close connection on drop");
        }
    }
}

fn copy_staged(conn: &Connection, staged: &StagedTable<'_>, path: &str) -> Result<(), WrapperError> {
    let copy = sql::copy_to_parquet(&sql::select_all(staged.name()), path);
    debug!(sql = %copy, "copying staged rows");
    conn.execute_batch(&copy)?;
    Ok(())
}
