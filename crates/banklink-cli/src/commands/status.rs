//! Status command implementation

use std::path::Path;

use anyhow::Result;
use banklink_core::db::DB_KEY_ENV;
use banklink_core::models::{IdentifierKind, UploadStatus};
use banklink_core::storage::SIGNING_KEY_ENV;
use banklink_core::StorageConfig;

use super::open_db;

pub fn cmd_status(db_path: &Path, storage: &StorageConfig, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Banklink Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    println!("   Storage: {}", storage.root.display());
    println!(
        "   Buckets: {} (sheets), {} (ledgers)",
        storage.raw_bucket, storage.ledger_bucket
    );
    if std::env::var(SIGNING_KEY_ENV).is_ok() {
        println!("   ✍️  Upload signing: configured");
    } else {
        println!("   ⚠️  Upload signing: {} not set", SIGNING_KEY_ENV);
    }

    // Try to open the database and show stats
    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                println!();
                if let Ok(count) = db.count_customers() {
                    println!("   Customers: {}", count);
                }
                for kind in IdentifierKind::ALL {
                    if let Ok(count) = db.count_identifiers(kind) {
                        println!("     {:<10} {}", kind.as_str(), count);
                    }
                }
                println!();
                for status in [
                    UploadStatus::Pending,
                    UploadStatus::InProgress,
                    UploadStatus::Completed,
                    UploadStatus::Failed,
                ] {
                    if let Ok(count) = db.count_uploads_by_status(status) {
                        println!("   Uploads {:<12} {}", status.as_str(), count);
                    }
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}
