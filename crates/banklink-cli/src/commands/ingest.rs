//! Ingestion command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use banklink_core::{Ingestor, StorageConfig};

use super::open_db;

/// Run one ingestion synchronously and report the outcome
///
/// The upload row records failures; the error is also returned so the
/// process exits non-zero.
pub fn cmd_ingest(
    db_path: &Path,
    storage: &StorageConfig,
    bucket: Option<&str>,
    key: &str,
    no_encrypt: bool,
) -> Result<()> {
    let bucket = bucket.unwrap_or(&storage.raw_bucket);
    println!("📥 Ingesting {}/{}...", bucket, key);

    let db = open_db(db_path, no_encrypt)?;
    let store = storage
        .open()
        .with_context(|| format!("Failed to open object store at {}", storage.root.display()))?;
    let ingestor = Ingestor::new(db, Arc::new(store), storage.ledger_bucket.clone());

    let report = ingestor
        .run(bucket, key)
        .with_context(|| format!("Ingestion of {}/{} failed", bucket, key))?;

    println!("✅ Ingestion complete: {} {}", report.year, report.bank);
    println!("   Rows: {}", report.rows);
    println!("   New customers: {}", report.customers_created);
    println!("   New identifiers: {}", report.identifiers_added);
    println!("   Ledger: {}/{}", storage.ledger_bucket, report.ledger_key);
    println!("   Elapsed: {:.2}s", report.elapsed.as_secs_f64());

    Ok(())
}
