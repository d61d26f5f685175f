use duckdb::arrow::error::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("connection is not open")]
    NotConnected,
    #[error("cloud credentials unavailable: {0}")]
    CredentialsUnavailable(String),
    #[error("unsupported file type: {0} (expected a parquet or csv path)")]
    UnsupportedFileType(String),
    #[error("no records provided")]
    EmptyInput,
    #[error("query expects {expected} parameters but {supplied} were supplied")]
    ParameterMismatch { expected: usize, supplied: usize },
    #[error("query has no parameter named '{0}'")]
    UnknownParameter(String),
    #[error("parameter '{0}' was supplied more than once")]
    DuplicateParameter(String),
    #[error("no value supplied for parameter(s): {0}")]
    MissingParameters(String),
    #[error("invalid records: {0}")]
    InvalidRecords(String),
    #[error("unsupported column type: {0}")]
    UnsupportedColumnType(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Broad classification of a [`WrapperError`].
///
/// Everything the wrapper does not detect itself is reported as
/// [`ErrorKind::Engine`] and carries the collaborator's error verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    CredentialsUnavailable,
    UnsupportedFileType,
    EmptyInput,
    ParameterMismatch,
    InvalidRecords,
    Engine,
}

impl WrapperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WrapperError::NotConnected => ErrorKind::NotConnected,
            WrapperError::CredentialsUnavailable(_) => ErrorKind::CredentialsUnavailable,
            WrapperError::UnsupportedFileType(_) => ErrorKind::UnsupportedFileType,
            WrapperError::EmptyInput => ErrorKind::EmptyInput,
            WrapperError::ParameterMismatch { .. }
            | WrapperError::UnknownParameter(_)
            | WrapperError::DuplicateParameter(_)
            | WrapperError::MissingParameters(_) => ErrorKind::ParameterMismatch,
            WrapperError::InvalidRecords(_) | WrapperError::UnsupportedColumnType(_) => {
                ErrorKind::InvalidRecords
            }
            WrapperError::DuckDb(_) | WrapperError::Arrow(_) | WrapperError::Internal(_) => {
                ErrorKind::Engine
            }
        }
    }
}
