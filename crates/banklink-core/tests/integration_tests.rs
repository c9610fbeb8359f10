//! Integration tests for banklink-core
//!
//! These tests exercise the full upload → ingest → aggregate workflow against
//! a temporary object store.

use std::cell::{Cell, RefCell};

use banklink_core::{
    aggregate::{customer_with_summary, summarize_customer, BankFilter},
    db::{Database, UpsertOutcome},
    identifiers::ParsedIdentifiers,
    ingest::{reserve_upload, IdentityStore, IngestLocks, Pipeline, UploadStore},
    ledger::{self, LedgerWriter},
    models::{IdentifierKind, TransactionSummary, UploadStatus},
    resolver::IdentifierLookup,
    storage::{LocalObjectStore, ObjectStore, SigningConfig, UploadSigner},
    tracker::UploadState,
    Error, Result,
};
use tempfile::TempDir;

const RAW: &str = "banks-raw";
const LEDGERS: &str = "banks";
const HEADER: &str = "EMAIL,MOBILE_NO,NAME,ADDRESS,TAX_ID,TIN,RC,TRXN_AMOUNT,TRXN_DATE";

struct Fixture {
    _dir: TempDir,
    db: Database,
    store: LocalObjectStore,
    locks: IngestLocks,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalObjectStore::new(dir.path().join("objects")).unwrap();
        Self {
            _dir: dir,
            db: Database::in_memory().expect("Failed to create in-memory database"),
            store,
            locks: IngestLocks::default(),
        }
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            identities: &self.db,
            uploads: &self.db,
            store: &self.store,
            ledger_bucket: LEDGERS,
            locks: &self.locks,
        }
    }

    fn put_source(&self, key: &str, rows: &[String]) {
        let mut csv = String::from(HEADER);
        for row in rows {
            csv.push('\n');
            csv.push_str(row);
        }
        self.store.put(RAW, key, csv.as_bytes()).unwrap();
    }

    fn upload_status(&self, year: i32, bank: &str) -> (UploadStatus, i64, String) {
        let upload = self.db.get_upload(year, bank).unwrap().unwrap();
        (upload.status, upload.progress, upload.message)
    }
}

/// `n` rows, each with a unique email and mobile, amount = row number
fn numbered_rows(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("user{i}@bank.com,0800{i:07},User {i},,,,,{i},2024-01-{:02}", i % 28 + 1))
        .collect()
}

/// Upload store that records every state it is asked to persist
struct RecordingUploads<'a> {
    db: &'a Database,
    states: RefCell<Vec<UploadState>>,
}

impl UploadStore for RecordingUploads<'_> {
    fn save_state(&self, year: i32, bank: &str, state: &UploadState) -> Result<()> {
        self.states.borrow_mut().push(state.clone());
        self.db.save_state(year, bank, state)
    }
}

/// Identity store that fails on the `fail_on`-th upsert (1-based)
struct FailingIdentities<'a> {
    db: &'a Database,
    fail_on: usize,
    calls: Cell<usize>,
}

impl IdentifierLookup for FailingIdentities<'_> {
    fn find_owner(&self, kind: IdentifierKind, values: &[String]) -> Result<Option<i64>> {
        self.db.find_owner(kind, values)
    }
}

impl IdentityStore for FailingIdentities<'_> {
    fn upsert(
        &self,
        customer_id: Option<i64>,
        identifiers: &ParsedIdentifiers,
    ) -> Result<UpsertOutcome> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_on {
            return Err(Error::Storage("injected failure".to_string()));
        }
        self.db.upsert(customer_id, identifiers)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[test]
fn test_full_ingestion_workflow() {
    let fx = Fixture::new();
    fx.put_source(
        "2024__acme.csv",
        &[
            "Ada@Example.com,+2348000000001,Ada Lovelace,\"12 Marina Road, Lagos\",,TIN-1,,\"1,500.50\",2024-01-02".to_string(),
            "bob@example.com,08000000002,Bob,,TAX-9,,RC-7,200,2024-01-03".to_string(),
            "ada@example.com,,A. Lovelace,,,,,-50,".to_string(),
        ],
    );

    let report = fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(report.customers_created, 2);
    assert_eq!(report.ledger_key, "2024/acme.ledger");

    // Source consumed, ledger published
    assert!(!fx.store.exists(RAW, "2024__acme.csv").unwrap());
    let entries = ledger::read_ledger(&fx.store, LEDGERS, "2024/acme.ledger").unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].customer_id, entries[2].customer_id);
    assert_ne!(entries[0].customer_id, entries[1].customer_id);
    assert_eq!(entries[0].amount, Some(1500.5));
    assert_eq!(entries[0].date.as_deref(), Some("2024-01-02"));
    assert_eq!(entries[2].date, None);

    let ada = fx.db.get_customer(entries[0].customer_id).unwrap().unwrap();
    assert_eq!(ada.emails, vec!["ada@example.com"]);
    assert_eq!(ada.names, vec!["ada lovelace", "a. lovelace"]);
    assert_eq!(ada.addresses, vec!["12 marina road, lagos"]);
    assert_eq!(ada.tins, vec!["tin-1"]);

    let (status, progress, message) = fx.upload_status(2024, "acme");
    assert_eq!(status, UploadStatus::Completed);
    assert_eq!(progress, 100);
    assert!(message.starts_with("Processing completed: elapsed "));
}

#[test]
fn test_xlsx_workbook_ingestion() {
    let fx = Fixture::new();
    fx.store
        .put(RAW, "2024__acme.xlsx", include_bytes!("fixtures/2024__acme.xlsx"))
        .unwrap();

    let report = fx.pipeline().run(RAW, "2024__acme.xlsx").unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(report.customers_created, 2);
    assert_eq!(report.ledger_key, "2024/acme.ledger");
    assert!(!fx.store.exists(RAW, "2024__acme.xlsx").unwrap());

    let entries = ledger::read_ledger(&fx.store, LEDGERS, "2024/acme.ledger").unwrap();
    assert_eq!(entries.len(), 3);
    // Numeric mobile cells link the third row back to the first
    assert_eq!(entries[0].customer_id, entries[2].customer_id);
    assert_eq!(entries[0].date.as_deref(), Some("2024-01-02"));
    assert_eq!(entries[2].date.as_deref(), Some("2024-01-03 12:00:00"));

    let ada = fx.db.get_customer(entries[0].customer_id).unwrap().unwrap();
    assert_eq!(ada.mobiles, vec!["8000000001"]);
    assert_eq!(ada.names, vec!["ada obi", "ada o."]);

    let summary =
        summarize_customer(&fx.store, LEDGERS, entries[0].customer_id, 2024, &BankFilter::All)
            .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].total_trxns, 2);
    assert_eq!(summary[0].total_amount, 105.5);

    assert_eq!(fx.upload_status(2024, "acme").0, UploadStatus::Completed);
}

#[test]
fn test_rerun_is_idempotent() {
    let fx = Fixture::new();
    let rows = numbered_rows(12);

    fx.put_source("2024__acme.csv", &rows);
    fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    let first = fx.store.get(LEDGERS, "2024/acme.ledger").unwrap();
    let customers = fx.db.count_customers().unwrap();
    let emails = fx.db.count_identifiers(IdentifierKind::Email).unwrap();
    let names = fx.db.count_identifiers(IdentifierKind::Name).unwrap();

    fx.put_source("2024__acme.csv", &rows);
    let report = fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    let second = fx.store.get(LEDGERS, "2024/acme.ledger").unwrap();

    assert_eq!(first, second, "ledger must be byte-identical");
    assert_eq!(report.customers_created, 0);
    assert_eq!(report.identifiers_added, 0);
    assert_eq!(fx.db.count_customers().unwrap(), customers);
    assert_eq!(fx.db.count_identifiers(IdentifierKind::Email).unwrap(), emails);
    assert_eq!(fx.db.count_identifiers(IdentifierKind::Name).unwrap(), names);
}

#[test]
fn test_rows_resolve_against_earlier_rows() {
    let fx = Fixture::new();
    fx.put_source(
        "2024__acme.csv",
        &[
            "a@x.com,0801,,,,,,1,".to_string(),
            // New email, known mobile: same customer
            "b@x.com,0801,,,,,,2,".to_string(),
            // Only a known secondary email
            "b@x.com,,,,,,,3,".to_string(),
        ],
    );

    let report = fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    assert_eq!(report.customers_created, 1);

    let customer = fx.db.list_customers(&Default::default(), 0, 10).unwrap();
    assert_eq!(customer.total, 1);
    assert_eq!(customer.customers[0].emails, vec!["a@x.com", "b@x.com"]);
}

#[test]
fn test_cascade_priority_email_then_tin() {
    let fx = Fixture::new();
    fx.put_source(
        "2023__seed.csv",
        &[
            "owner@x.com,,,,,,,0,".to_string(),
            ",0802,,,,,,0,".to_string(),
            ",,,,,TIN-1,,0,".to_string(),
            ",,,,,,RC-1,0,".to_string(),
        ],
    );
    fx.pipeline().run(RAW, "2023__seed.csv").unwrap();
    let seeded = ledger::read_ledger(&fx.store, LEDGERS, "2023/seed.ledger").unwrap();
    let (email_owner, mobile_owner, tin_owner) = (
        seeded[0].customer_id,
        seeded[1].customer_id,
        seeded[2].customer_id,
    );

    fx.put_source(
        "2024__acme.csv",
        &[
            // Email and mobile point at different customers: email wins
            "owner@x.com,0802,,,,,,1,".to_string(),
            // No contact match, TIN and RC on different customers: TIN wins
            "new@x.com,0999,,,,TIN-1,RC-1,1,".to_string(),
        ],
    );
    fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    let entries = ledger::read_ledger(&fx.store, LEDGERS, "2024/acme.ledger").unwrap();

    assert_eq!(entries[0].customer_id, email_owner);
    assert_eq!(entries[1].customer_id, tin_owner);

    // The mobile stays with its original owner
    let mobile = fx
        .db
        .find_customer_id(IdentifierKind::Mobile, &["0802".to_string()])
        .unwrap();
    assert_eq!(mobile, Some(mobile_owner));
}

#[test]
fn test_progress_updates_for_97_rows() {
    let fx = Fixture::new();
    fx.put_source("2024__acme.csv", &numbered_rows(97));

    let uploads = RecordingUploads {
        db: &fx.db,
        states: RefCell::new(Vec::new()),
    };
    let pipeline = Pipeline {
        uploads: &uploads,
        ..fx.pipeline()
    };
    pipeline.run(RAW, "2024__acme.csv").unwrap();

    let states = uploads.states.borrow();
    let checkpoints: Vec<&UploadState> = states
        .iter()
        .filter(|s| s.message.starts_with("Processed "))
        .collect();

    assert_eq!(checkpoints.len(), 10);
    assert!(checkpoints
        .iter()
        .all(|s| s.status == UploadStatus::InProgress));
    assert!(checkpoints.windows(2).all(|w| w[0].progress < w[1].progress));
    assert_eq!(checkpoints[0].progress, 10);
    let last = checkpoints.last().unwrap();
    assert_eq!(last.progress, 100);
    assert!(last.message.starts_with("Processed 97 of 97 rows"));

    assert_eq!(states.first().unwrap().message, "Started processing");
    assert_eq!(states.last().unwrap().status, UploadStatus::Completed);
}

#[test]
fn test_bad_row_fails_run() {
    let fx = Fixture::new();
    let mut rows = numbered_rows(100);
    rows[50] = "bad@bank.com,,,,,,,not-a-number,2024-01-01".to_string();
    fx.put_source("2024__acme.csv", &rows);

    let err = fx.pipeline().run(RAW, "2024__acme.csv").unwrap_err();
    assert!(err.to_string().contains("Row 51"));

    let (status, progress, message) = fx.upload_status(2024, "acme");
    assert_eq!(status, UploadStatus::Failed);
    assert_eq!(progress, 0);
    assert!(message.starts_with("Processing failed: "));
    assert!(message.contains("not-a-number"));

    // Rows before the failure stay committed; nothing is published
    assert_eq!(fx.db.count_customers().unwrap(), 50);
    assert!(!fx.store.exists(LEDGERS, "2024/acme.ledger").unwrap());
    assert!(fx.store.exists(RAW, "2024__acme.csv").unwrap());
}

#[test]
fn test_store_failure_mid_run() {
    let fx = Fixture::new();
    fx.put_source("2024__acme.csv", &numbered_rows(100));

    let identities = FailingIdentities {
        db: &fx.db,
        fail_on: 51,
        calls: Cell::new(0),
    };
    let pipeline = Pipeline {
        identities: &identities,
        ..fx.pipeline()
    };

    let err = pipeline.run(RAW, "2024__acme.csv").unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    let (status, progress, message) = fx.upload_status(2024, "acme");
    assert_eq!(status, UploadStatus::Failed);
    assert_eq!(progress, 0);
    assert!(message.contains("injected failure"));
    assert_eq!(fx.db.count_customers().unwrap(), 50);
    assert_eq!(fx.db.count_identifiers(IdentifierKind::Email).unwrap(), 50);
    assert!(fx.store.list(LEDGERS, "").unwrap().is_empty());

    // A retry starts over from the first row and completes
    fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    assert_eq!(fx.db.count_customers().unwrap(), 100);
    assert_eq!(fx.upload_status(2024, "acme").0, UploadStatus::Completed);
}

#[test]
fn test_missing_required_column_fails_run() {
    let fx = Fixture::new();
    fx.store
        .put(RAW, "2024__acme.csv", b"EMAIL,TRXN_DATE\na@x.com,2024-01-01")
        .unwrap();

    let err = fx.pipeline().run(RAW, "2024__acme.csv").unwrap_err();
    assert!(err.to_string().contains("TRXN_AMOUNT"));
    assert_eq!(fx.upload_status(2024, "acme").0, UploadStatus::Failed);
    assert_eq!(fx.db.count_customers().unwrap(), 0);
}

#[test]
fn test_missing_source_fails_run() {
    let fx = Fixture::new();
    let err = fx.pipeline().run(RAW, "2024__ghost.xlsx").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(fx.upload_status(2024, "ghost").0, UploadStatus::Failed);
}

#[test]
fn test_invalid_key_touches_nothing() {
    let fx = Fixture::new();
    fx.store.put(RAW, "report.xlsx", b"whatever").unwrap();

    let err = fx.pipeline().run(RAW, "report.xlsx").unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
    assert_eq!(fx.db.list_uploads().unwrap().total, 0);
}

#[test]
fn test_concurrent_run_for_same_key_is_rejected() {
    let fx = Fixture::new();
    fx.put_source("2024__acme.csv", &numbered_rows(3));
    fx.db.reserve_upload(2024, "acme").unwrap();

    let guard = fx.locks.try_acquire(2024, "acme").unwrap();
    let err = fx.pipeline().run(RAW, "2024__acme.csv").unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(fx.upload_status(2024, "acme").0, UploadStatus::Pending);

    drop(guard);
    fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    assert_eq!(fx.upload_status(2024, "acme").0, UploadStatus::Completed);
}

#[test]
fn test_empty_sheet_publishes_empty_ledger() {
    let fx = Fixture::new();
    fx.put_source("2024__quiet.csv", &[]);

    let report = fx.pipeline().run(RAW, "2024__quiet.csv").unwrap();
    assert_eq!(report.rows, 0);
    assert!(ledger::read_ledger(&fx.store, LEDGERS, "2024/quiet.ledger")
        .unwrap()
        .is_empty());
    assert_eq!(fx.upload_status(2024, "quiet").1, 100);
}

// =============================================================================
// Aggregation
// =============================================================================

fn publish(store: &LocalObjectStore, year: i32, bank: &str, rows: &[(i64, f64, &str)]) {
    let mut writer = LedgerWriter::default();
    for (customer_id, amount, date) in rows {
        writer.push(*customer_id, Some(*amount), Some(date.to_string()));
    }
    writer.publish(store, LEDGERS, year, bank).unwrap();
}

#[test]
fn test_aggregation_across_banks() {
    let fx = Fixture::new();
    publish(&fx.store, 2024, "bankA", &[(7, 100.0, "d1"), (9, 50.0, "d2")]);
    publish(&fx.store, 2024, "bankB", &[(7, 25.0, "d3")]);
    publish(&fx.store, 2023, "bankA", &[(7, 999.0, "d0")]);

    let all = summarize_customer(&fx.store, LEDGERS, 7, 2024, &BankFilter::parse("all")).unwrap();
    assert_eq!(
        all,
        vec![
            TransactionSummary {
                bank: "bankA".to_string(),
                total_trxns: 1,
                total_amount: 100.0,
            },
            TransactionSummary {
                bank: "bankB".to_string(),
                total_trxns: 1,
                total_amount: 25.0,
            },
        ]
    );

    let only_b = summarize_customer(&fx.store, LEDGERS, 7, 2024, &BankFilter::parse("bankB")).unwrap();
    assert_eq!(only_b, vec![all[1].clone()]);

    let none = summarize_customer(&fx.store, LEDGERS, 7, 2022, &BankFilter::All).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_customer_with_summary() {
    let fx = Fixture::new();
    fx.put_source(
        "2024__acme.csv",
        &[
            "a@x.com,,,,,,,10,".to_string(),
            "a@x.com,,,,,,,5.5,".to_string(),
            "b@x.com,,,,,,,1,".to_string(),
        ],
    );
    fx.pipeline().run(RAW, "2024__acme.csv").unwrap();
    let id = fx
        .db
        .find_customer_id(IdentifierKind::Email, &["a@x.com".to_string()])
        .unwrap()
        .unwrap();

    let found = customer_with_summary(&fx.db, &fx.store, LEDGERS, id, 2024, &BankFilter::All).unwrap();
    assert_eq!(found.customer.id, id);
    assert_eq!(found.trxn_summary.len(), 1);
    assert_eq!(found.trxn_summary[0].bank, "acme");
    assert_eq!(found.trxn_summary[0].total_trxns, 2);
    assert_eq!(found.trxn_summary[0].total_amount, 15.5);

    let missing = customer_with_summary(&fx.db, &fx.store, LEDGERS, 424242, 2024, &BankFilter::All);
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[test]
fn test_corrupt_ledger_fails_read() {
    let fx = Fixture::new();
    fx.store.put(LEDGERS, "2024/broken.ledger", b"garbage").unwrap();
    let result = summarize_customer(&fx.store, LEDGERS, 1, 2024, &BankFilter::All);
    assert!(matches!(result, Err(Error::CorruptLedger(_))));
}

// =============================================================================
// Upload reservation
// =============================================================================

#[test]
fn test_reserve_upload() {
    let fx = Fixture::new();
    let signer = UploadSigner::new(&SigningConfig {
        key: "secret".to_string(),
        ttl_secs: 3600,
        public_url: "http://localhost:3000".to_string(),
    })
    .unwrap();

    let (url, upload) = reserve_upload(&fx.db, &signer, RAW, 2024, " acme ", 1_000).unwrap();
    assert_eq!(url.key, "2024__acme.xlsx");
    assert_eq!(url.expires, 4_600);
    assert!(url
        .url
        .starts_with("http://localhost:3000/objects/banks-raw/2024__acme.xlsx?expires=4600&signature="));
    assert_eq!(upload.status, UploadStatus::Pending);
    assert_eq!(upload.bank, "acme");

    assert!(matches!(
        reserve_upload(&fx.db, &signer, RAW, 2024, "a/b", 1_000),
        Err(Error::InvalidKey(_))
    ));
}
