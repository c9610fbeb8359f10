//! Banklink Core Library
//!
//! Shared functionality for the banklink ingestion service:
//! - Database access and migrations (customers, identifiers, uploads)
//! - Spreadsheet reading (xlsx and CSV) into typed input rows
//! - Identifier parsing and the identity resolution cascade
//! - Upload state tracking
//! - Object storage with signed upload URLs
//! - Ledger publishing and read-side aggregation
//! - The ingestion pipeline tying it all together

pub mod aggregate;
pub mod db;
pub mod error;
pub mod identifiers;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod resolver;
pub mod sheet;
pub mod storage;
pub mod tracker;

pub use aggregate::{customer_with_summary, summarize_customer, BankFilter};
pub use db::{Database, UpsertOutcome};
pub use error::{Error, Result};
pub use identifiers::ParsedIdentifiers;
pub use ingest::{
    reserve_upload, IdentityStore, IngestLocks, IngestReport, Ingestor, Pipeline, SourceKey,
    UploadStore,
};
pub use ledger::{LedgerEntry, LedgerWriter};
pub use models::{
    Customer, CustomerFilter, CustomerList, CustomerWithSummary, IdentifierKind,
    TransactionSummary, Upload, UploadList, UploadStatus,
};
pub use resolver::{resolve, IdentifierLookup, Match};
pub use sheet::{CellValue, InputRow, SheetFormat};
pub use storage::{
    LocalObjectStore, ObjectInfo, ObjectStore, SignedUrl, SigningConfig, StorageConfig,
    UploadSigner,
};
pub use tracker::{ProgressSchedule, UploadEvent, UploadState};
