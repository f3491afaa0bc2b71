use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store not initialized: {0}")]
    NotInitialized(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::Sqlite(_) => "STORAGE_ERROR",
            Error::Json(_) => "ENCODING_ERROR",
            Error::NotInitialized(_) => "NOT_INITIALIZED",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidQuery(_) => "INVALID_QUERY",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the error is the caller's fault rather than the store's.
    ///
    /// Client errors surface as validation failures at the boundary; everything
    /// else is reported as a generic server-side error without leaking SQL or
    /// file-path details.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::InvalidQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
