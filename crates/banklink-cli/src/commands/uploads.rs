//! Upload progress listing and recovery

use std::path::Path;

use anyhow::Result;

use super::{open_db, truncate};

pub fn cmd_uploads(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let list = db.list_uploads()?;

    if list.uploads.is_empty() {
        println!("No uploads yet.");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<12} {:>5}  {}",
        "Year", "Bank", "Status", "%", "Message"
    );
    println!("{}", "─".repeat(90));
    for upload in &list.uploads {
        println!(
            "{:<6} {:<24} {:<12} {:>5}  {}",
            upload.year,
            truncate(&upload.bank, 24),
            upload.status.as_str(),
            upload.progress,
            truncate(&upload.message, 40)
        );
    }
    println!();
    println!("{} upload(s)", list.total);

    Ok(())
}

pub fn cmd_recover(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let count = db.recover_interrupted_uploads()?;

    if count == 0 {
        println!("No interrupted uploads.");
    } else {
        println!("⚠️  Marked {} interrupted upload(s) as failed", count);
        println!("   Upload those sheets again to retry.");
    }

    Ok(())
}
