//! Spreadsheet ingestion
//!
//! One run takes a source object `{year}__{bank}.{xlsx|csv}` from the raw
//! bucket and, row by row in sheet order:
//!
//! 1. parses candidate identifiers
//! 2. resolves the row to an existing customer (or none)
//! 3. upserts the customer with every identifier the row carries
//! 4. records `(customer_id, amount, date)` for the ledger
//!
//! Progress is persisted at every checkpoint of the [`ProgressSchedule`].
//! Once all rows succeed the ledger is published and the source object is
//! removed. Any error stops the run, marks the upload failed and is returned
//! to the caller. Customer writes already committed stay in place and no
//! ledger is written.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{Database, UpsertOutcome};
use crate::error::{Error, Result};
use crate::identifiers::ParsedIdentifiers;
use crate::ledger::LedgerWriter;
use crate::models::Upload;
use crate::resolver::{self, IdentifierLookup};
use crate::sheet::{self, SheetFormat};
use crate::storage::{ObjectStore, SignedUrl, UploadSigner};
use crate::tracker::{self, ProgressSchedule, UploadEvent, UploadState};

/// Where a run writes customers
pub trait IdentityStore: IdentifierLookup {
    /// Attach identifiers to `customer_id`, or to a new customer when `None`
    fn upsert(&self, customer_id: Option<i64>, identifiers: &ParsedIdentifiers)
        -> Result<UpsertOutcome>;
}

/// Where a run records its upload state
pub trait UploadStore {
    fn save_state(&self, year: i32, bank: &str, state: &UploadState) -> Result<()>;
}

impl IdentityStore for Database {
    fn upsert(
        &self,
        customer_id: Option<i64>,
        identifiers: &ParsedIdentifiers,
    ) -> Result<UpsertOutcome> {
        self.upsert_customer(customer_id, identifiers)
    }
}

impl UploadStore for Database {
    fn save_state(&self, year: i32, bank: &str, state: &UploadState) -> Result<()> {
        self.save_upload(year, bank, state).map(|_| ())
    }
}

/// A parsed source object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub year: i32,
    pub bank: String,
    pub format: SheetFormat,
}

impl SourceKey {
    /// Parse `{year}__{bank}.{xlsx|csv}`
    pub fn parse(key: &str) -> Result<Self> {
        let re = Regex::new(r"^(?P<year>\d{1,9})__(?P<bank>[^/\\]+)\.(?P<ext>[A-Za-z]+)$")?;
        let invalid = || {
            Error::InvalidKey(format!(
                "Expected {{year}}__{{bank}}.xlsx or .csv, got {:?}",
                key
            ))
        };

        let caps = re.captures(key).ok_or_else(invalid)?;
        let year: i32 = caps["year"].parse().map_err(|_| invalid())?;
        let bank = caps["bank"].trim();
        let format = SheetFormat::from_extension(&caps["ext"]).ok_or_else(invalid)?;

        Self::new(year, bank, format).map_err(|_| invalid())
    }

    /// Validate a (year, bank) pair for a new source object
    pub fn new(year: i32, bank: &str, format: SheetFormat) -> Result<Self> {
        let bank = bank.trim();
        if bank.is_empty() || bank.starts_with('.') || bank.contains(['/', '\\']) {
            return Err(Error::InvalidKey(format!("Invalid bank name: {:?}", bank)));
        }
        if year <= 0 {
            return Err(Error::InvalidKey(format!("Invalid year: {}", year)));
        }
        Ok(Self {
            year,
            bank: bank.to_string(),
            format,
        })
    }

    /// The object key this source is stored under
    pub fn object_key(&self) -> String {
        format!("{}__{}.{}", self.year, self.bank, self.format.as_str())
    }
}

/// Keys of runs currently executing in this process
#[derive(Debug, Clone, Default)]
pub struct IngestLocks {
    running: Arc<Mutex<HashSet<(i32, String)>>>,
}

/// Held for the duration of one run; releases its key on drop
#[derive(Debug)]
pub struct IngestGuard {
    running: Arc<Mutex<HashSet<(i32, String)>>>,
    key: (i32, String),
}

impl IngestLocks {
    /// The guard shared by every run in this process
    pub fn global() -> &'static IngestLocks {
        static GLOBAL: OnceLock<IngestLocks> = OnceLock::new();
        GLOBAL.get_or_init(IngestLocks::default)
    }

    /// Claim (year, bank), or `Error::Conflict` if a run already holds it
    pub fn try_acquire(&self, year: i32, bank: &str) -> Result<IngestGuard> {
        let key = (year, bank.to_string());
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(key.clone()) {
            return Err(Error::Conflict(format!(
                "Ingestion for {} / {} is already running",
                year, bank
            )));
        }
        Ok(IngestGuard {
            running: Arc::clone(&self.running),
            key,
        })
    }

    pub fn is_running(&self, year: i32, bank: &str) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.contains(&(year, bank.to_string()))
    }
}

impl Drop for IngestGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.key);
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub year: i32,
    pub bank: String,
    pub rows: usize,
    pub customers_created: usize,
    pub identifiers_added: usize,
    pub ledger_key: String,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Applies tracker events and persists each resulting state
struct Progress<'a> {
    uploads: &'a dyn UploadStore,
    year: i32,
    bank: &'a str,
    state: UploadState,
}

impl Progress<'_> {
    fn advance(&mut self, event: UploadEvent) -> Result<()> {
        let next = tracker::apply(std::mem::take(&mut self.state), event);
        let saved = self.uploads.save_state(self.year, self.bank, &next);
        self.state = next;
        saved
    }
}

/// Everything one run needs, borrowed from the caller
pub struct Pipeline<'a> {
    pub identities: &'a dyn IdentityStore,
    pub uploads: &'a dyn UploadStore,
    pub store: &'a dyn ObjectStore,
    pub ledger_bucket: &'a str,
    pub locks: &'a IngestLocks,
}

impl Pipeline<'_> {
    /// Ingest `bucket/key` end to end
    ///
    /// A key that doesn't name a source spreadsheet is rejected before the
    /// upload row is touched, and so is a second run for a (year, bank)
    /// that is already running here.
    pub fn run(&self, bucket: &str, key: &str) -> Result<IngestReport> {
        let source = SourceKey::parse(key)?;
        let _guard = self.locks.try_acquire(source.year, &source.bank)?;

        info!(bucket, key, year = source.year, bank = %source.bank, "Starting ingestion");

        let mut progress = Progress {
            uploads: self.uploads,
            year: source.year,
            bank: &source.bank,
            state: UploadState::pending(),
        };

        match self.process(bucket, key, &source, &mut progress) {
            Ok(report) => {
                info!(
                    year = report.year,
                    bank = %report.bank,
                    rows = report.rows,
                    customers_created = report.customers_created,
                    "Ingestion completed in {:.2}s",
                    report.elapsed.as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                error!(year = source.year, bank = %source.bank, "Ingestion failed: {}", e);
                if let Err(e2) = progress.advance(UploadEvent::Failed {
                    error: e.to_string(),
                }) {
                    error!("Failed to mark upload as failed: {}", e2);
                }
                Err(e)
            }
        }
    }

    fn process(
        &self,
        bucket: &str,
        key: &str,
        source: &SourceKey,
        progress: &mut Progress<'_>,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        progress.advance(UploadEvent::Started)?;

        let bytes = self.store.get(bucket, key)?;
        let rows = sheet::read_rows(&bytes, source.format)?;
        let total = rows.len();
        if total == 0 {
            warn!(key, "Source has no data rows");
        }

        let schedule = ProgressSchedule::new(total);
        let mut ledger = LedgerWriter::with_capacity(total);
        let mut customers_created = 0;
        let mut identifiers_added = 0;

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;

            // Amount first: a bad row must not touch the customer store
            let amount = row
                .transaction_amount()
                .map_err(|e| Error::Ingest(format!("Row {}: {}", row_number, e)))?;

            let identifiers = ParsedIdentifiers::from_row(row);
            if identifiers.is_empty() {
                debug!(row = row_number, "Row carries no identifiers");
            }

            let matched = resolver::resolve(self.identities, &identifiers)?;
            if let Some(m) = matched {
                debug!(row = row_number, customer_id = m.customer_id, kind = %m.kind, "Resolved row");
            }

            let outcome = self
                .identities
                .upsert(matched.map(|m| m.customer_id), &identifiers)?;
            if outcome.created {
                customers_created += 1;
            }
            identifiers_added += outcome.identifiers_added;

            ledger.push(outcome.customer_id, amount, row.transaction_date());

            if schedule.is_checkpoint(row_number) {
                progress.advance(UploadEvent::Progressed {
                    processed: row_number,
                    total,
                    elapsed: started.elapsed(),
                })?;
                info!(
                    "Progress: {}% ({}/{})",
                    progress.state.progress, row_number, total
                );
            }
        }

        let ledger_key = ledger.publish(self.store, self.ledger_bucket, source.year, &source.bank)?;
        self.store.delete(bucket, key)?;

        let elapsed = started.elapsed();
        progress.advance(UploadEvent::Completed { elapsed })?;

        Ok(IngestReport {
            year: source.year,
            bank: source.bank.clone(),
            rows: total,
            customers_created,
            identifiers_added,
            ledger_key,
            elapsed,
        })
    }
}

/// Owned ingestion entry point for long-lived callers (server, CLI)
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    store: Arc<dyn ObjectStore>,
    ledger_bucket: String,
    locks: IngestLocks,
}

impl Ingestor {
    /// Runs share the process-wide guard
    pub fn new(db: Database, store: Arc<dyn ObjectStore>, ledger_bucket: impl Into<String>) -> Self {
        Self {
            db,
            store,
            ledger_bucket: ledger_bucket.into(),
            locks: IngestLocks::global().clone(),
        }
    }

    /// Use a private guard instead of the process-wide one
    pub fn with_locks(mut self, locks: IngestLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn is_running(&self, year: i32, bank: &str) -> bool {
        self.locks.is_running(year, bank)
    }

    /// Run one ingestion synchronously
    pub fn run(&self, bucket: &str, key: &str) -> Result<IngestReport> {
        Pipeline {
            identities: &self.db,
            uploads: &self.db,
            store: self.store.as_ref(),
            ledger_bucket: &self.ledger_bucket,
            locks: &self.locks,
        }
        .run(bucket, key)
    }
}

/// Reserve an ingestion slot and issue a write URL for its source sheet
///
/// The upload row for (year, bank) is reset to pending.
pub fn reserve_upload(
    db: &Database,
    signer: &UploadSigner,
    raw_bucket: &str,
    year: i32,
    bank: &str,
    now: i64,
) -> Result<(SignedUrl, Upload)> {
    let source = SourceKey::new(year, bank, SheetFormat::Xlsx)?;
    let url = signer.sign_put(raw_bucket, &source.object_key(), now)?;
    let upload = db.reserve_upload(source.year, &source.bank)?;

    info!(year, bank = %source.bank, expires = url.expires, "Reserved upload slot");
    Ok((url, upload))
}
