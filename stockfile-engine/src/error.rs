//! Store error handling
//!
//! Only structural failures surface as errors. Logical rejections such as a
//! duplicate id or an oversell are reported through `bool`/count results by
//! the store operations themselves.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the stockfile engine
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation needed the data file but the store is closed
    #[error("database is not open")]
    NotOpen,

    /// No data file path has been configured yet
    #[error("database file is not set")]
    NoPath,

    #[error("backup file not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    #[error("invalid CSV at line {line}: {reason}")]
    InvalidCsv { line: usize, reason: String },

    /// A backup target resolves to the data file itself
    #[error("backup target is the active data file: {}", .0.display())]
    BackupIsActive(PathBuf),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
