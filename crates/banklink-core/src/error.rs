//! Error types for banklink

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Corrupt ledger: {0}")]
    CorruptLedger(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Signature error: {0}")]
    Signature(String),
}

pub type Result<T> = std::result::Result<T, Error>;
