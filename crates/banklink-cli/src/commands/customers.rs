//! Customer search and summary commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Datelike;

use banklink_core::models::CustomerFilter;
use banklink_core::{BankFilter, StorageConfig};

use super::{open_db, truncate};
use crate::cli::CustomerFilterArgs;

pub fn cmd_customers(
    db_path: &Path,
    filter: CustomerFilterArgs,
    offset: i64,
    limit: i64,
    json: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let filter = CustomerFilter {
        name: filter.name,
        email: filter.email,
        mobile_no: filter.mobile_no,
        tax_id: filter.tax_id,
        tin: filter.tin,
        rc: filter.rc,
    };

    let list = db.list_customers(&filter, offset, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if list.customers.is_empty() {
        println!("No matching customers.");
        return Ok(());
    }

    println!(
        "{:>8}  {:<28} {:<32} {:<16}",
        "ID", "Name", "Email", "Mobile"
    );
    println!("{}", "─".repeat(88));
    for customer in &list.customers {
        let first = |values: &[String]| values.first().cloned().unwrap_or_default();
        println!(
            "{:>8}  {:<28} {:<32} {:<16}",
            customer.id,
            truncate(&first(&customer.names), 28),
            truncate(&first(&customer.emails), 32),
            truncate(&first(&customer.mobiles), 16)
        );
    }
    println!();
    println!(
        "Showing {}-{} of {}",
        list.offset + 1,
        list.offset + list.customers.len() as i64,
        list.total
    );

    Ok(())
}

pub fn cmd_customer(
    db_path: &Path,
    storage: &StorageConfig,
    id: i64,
    year: Option<i32>,
    bank: &str,
    json: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let store = storage
        .open()
        .with_context(|| format!("Failed to open object store at {}", storage.root.display()))?;
    let year = year.unwrap_or_else(|| chrono::Utc::now().year());

    let result = banklink_core::customer_with_summary(
        &db,
        &store,
        &storage.ledger_bucket,
        id,
        year,
        &BankFilter::parse(bank),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let customer = &result.customer;
    println!();
    println!("👤 Customer {}", customer.id);
    for kind in banklink_core::models::IdentifierKind::ALL {
        let values = customer.values(kind);
        if !values.is_empty() {
            println!("   {:<10} {}", kind.as_str(), values.join(", "));
        }
    }

    println!();
    println!("   Transactions in {}:", year);
    if result.trxn_summary.is_empty() {
        println!("   (no ledgers)");
    }
    for summary in &result.trxn_summary {
        println!(
            "   {:<24} {:>6} trxns  {:>16.2}",
            truncate(&summary.bank, 24),
            summary.total_trxns,
            summary.total_amount
        );
    }
    println!();

    Ok(())
}
