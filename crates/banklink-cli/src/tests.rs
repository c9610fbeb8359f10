//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::{Path, PathBuf};

use banklink_core::db::Database;
use banklink_core::models::{IdentifierKind, UploadStatus};
use banklink_core::{LedgerWriter, ObjectStore, StorageConfig};
use tempfile::{tempdir, TempDir};

use crate::cli::CustomerFilterArgs;
use crate::commands::{self, truncate};

struct Workspace {
    _dir: TempDir,
    db_path: PathBuf,
    storage: StorageConfig,
}

fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let storage = StorageConfig::with_root(dir.path().join("storage"));
    Workspace {
        _dir: dir,
        db_path,
        storage,
    }
}

fn open(path: &Path) -> Database {
    Database::new_unencrypted(path.to_str().unwrap()).unwrap()
}

fn put_sheet(storage: &StorageConfig, key: &str, body: &str) {
    storage
        .open()
        .unwrap()
        .put(&storage.raw_bucket, key, body.as_bytes())
        .unwrap();
}

const SHEET: &str = "EMAIL,MOBILE_NO,NAME,ADDRESS,TAX_ID,TIN,RC,TRXN_AMOUNT,TRXN_DATE
ada@bank.test,08000000001,Ada Obi,1 Marina,,,,100,2024-01-02
bola@bank.test,08000000002,Bola,,,,,20,2024-01-02
,08000000001,Ada O.,,,,,5.5,2024-01-03
";

// ========== Init & Status ==========

#[test]
fn test_cmd_init() {
    let ws = workspace();

    let result = commands::cmd_init(&ws.db_path, true);
    assert!(result.is_ok());

    // Verify database was created and migrated
    assert!(ws.db_path.exists());
    let db = open(&ws.db_path);
    assert_eq!(db.count_customers().unwrap(), 0);
}

#[test]
fn test_cmd_status() {
    let ws = workspace();

    // Status on non-existent db
    let result = commands::cmd_status(&ws.db_path, &ws.storage, true);
    assert!(result.is_ok());

    let db = open(&ws.db_path);
    db.reserve_upload(2024, "acme").unwrap();
    drop(db);

    let result = commands::cmd_status(&ws.db_path, &ws.storage, true);
    assert!(result.is_ok());
}

// ========== Ingest ==========

#[test]
fn test_cmd_ingest() {
    let ws = workspace();
    put_sheet(&ws.storage, "2024__acme.csv", SHEET);

    commands::cmd_ingest(&ws.db_path, &ws.storage, None, "2024__acme.csv", true).unwrap();

    let db = open(&ws.db_path);
    assert_eq!(db.count_customers().unwrap(), 2);
    assert_eq!(db.count_identifiers(IdentifierKind::Name).unwrap(), 3);

    let upload = db.get_upload(2024, "acme").unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Completed);
    assert_eq!(upload.progress, 100);

    let store = ws.storage.open().unwrap();
    assert!(!store.exists(&ws.storage.raw_bucket, "2024__acme.csv").unwrap());
    assert!(store.exists(&ws.storage.ledger_bucket, "2024/acme.ledger").unwrap());
}

#[test]
fn test_cmd_ingest_failure_is_recorded() {
    let ws = workspace();
    put_sheet(
        &ws.storage,
        "2024__acme.csv",
        "EMAIL,TRXN_AMOUNT,TRXN_DATE\nada@bank.test,not-a-number,2024-01-02\n",
    );

    let result = commands::cmd_ingest(&ws.db_path, &ws.storage, None, "2024__acme.csv", true);
    assert!(result.is_err());

    let db = open(&ws.db_path);
    let upload = db.get_upload(2024, "acme").unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert_eq!(db.count_customers().unwrap(), 0);
}

#[test]
fn test_cmd_ingest_rejects_bad_key() {
    let ws = workspace();

    let result = commands::cmd_ingest(&ws.db_path, &ws.storage, None, "acme.xlsx", true);
    assert!(result.is_err());

    let db = open(&ws.db_path);
    assert!(db.list_uploads().unwrap().uploads.is_empty());
}

#[test]
fn test_cmd_recover() {
    use banklink_core::{UploadEvent, UploadState};

    let ws = workspace();
    let db = open(&ws.db_path);
    let running = banklink_core::tracker::apply(UploadState::pending(), UploadEvent::Started);
    db.save_upload(2024, "acme", &running).unwrap();
    drop(db);

    commands::cmd_recover(&ws.db_path, true).unwrap();

    let db = open(&ws.db_path);
    let upload = db.get_upload(2024, "acme").unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert_eq!(upload.progress, 0);
}

// ========== Customers ==========

#[test]
fn test_cmd_customers() {
    let ws = workspace();
    put_sheet(&ws.storage, "2024__acme.csv", SHEET);
    commands::cmd_ingest(&ws.db_path, &ws.storage, None, "2024__acme.csv", true).unwrap();

    let filter = CustomerFilterArgs {
        name: Some("ada".to_string()),
        ..Default::default()
    };
    assert!(commands::cmd_customers(&ws.db_path, filter, 0, 10, false, true).is_ok());
    assert!(
        commands::cmd_customers(&ws.db_path, CustomerFilterArgs::default(), 0, 10, true, true)
            .is_ok()
    );
}

#[test]
fn test_cmd_customer() {
    let ws = workspace();
    let db = open(&ws.db_path);
    let id = db
        .upsert_customer(
            None,
            &banklink_core::ParsedIdentifiers {
                emails: vec!["ada@bank.test".to_string()],
                ..Default::default()
            },
        )
        .unwrap()
        .customer_id;

    let mut ledger = LedgerWriter::default();
    ledger.push(id, Some(10.0), None);
    ledger
        .publish(
            &ws.storage.open().unwrap(),
            &ws.storage.ledger_bucket,
            2024,
            "acme",
        )
        .unwrap();

    let result = commands::cmd_customer(
        &ws.db_path,
        &ws.storage,
        id,
        Some(2024),
        "all",
        false,
        true,
    );
    assert!(result.is_ok());

    let missing = commands::cmd_customer(
        &ws.db_path,
        &ws.storage,
        id + 100,
        Some(2024),
        "all",
        true,
        true,
    );
    assert!(missing.is_err());
}

// ========== Upload ==========

#[tokio::test]
async fn test_cmd_upload_requires_xlsx() {
    let result = commands::cmd_upload(
        "http://127.0.0.1:9",
        Some("token"),
        2024,
        "acme",
        Path::new("sheet.csv"),
    )
    .await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains(".xlsx"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_cmd_upload_missing_file() {
    let result = commands::cmd_upload(
        "http://127.0.0.1:9",
        Some("token"),
        2024,
        "acme",
        Path::new("/nonexistent/acme.xlsx"),
    )
    .await;

    assert!(result.is_err());
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is a long name", 10), "this is...");
}
