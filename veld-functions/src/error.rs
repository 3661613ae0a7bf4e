//! Host-level error type for the execution subsystem.
//!
//! Script-level faults never appear here: executors catch them and fold
//! them into `ExecutionResult` (see `result`). This enum is reserved for
//! dispatcher and configuration failures the caller must handle.

use thiserror::Error;
use veld_store::StoreError;

#[derive(Debug, Error)]
pub enum FunctionsError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FunctionsError {
    fn from(e: std::io::Error) -> Self {
        FunctionsError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for FunctionsError {
    fn from(e: serde_json::Error) -> Self {
        FunctionsError::Serde(e.to_string())
    }
}

pub type FunctionsResult<T> = Result<T, FunctionsError>;
