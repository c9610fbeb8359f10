//! Read-side ledger aggregation
//!
//! Answers "what did customer X do in year Y" by scanning that year's
//! ledgers. Each ledger read contributes one summary, even when the customer
//! has no rows in it; banks without a ledger for the year don't appear.

use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::ledger::{self, LedgerEntry};
use crate::models::{CustomerWithSummary, TransactionSummary};
use crate::storage::ObjectStore;

/// Which banks' ledgers to aggregate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BankFilter {
    #[default]
    All,
    Bank(String),
}

impl BankFilter {
    /// `"all"` (any case) or blank means no filter
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Bank(raw.to_string())
        }
    }

    pub fn matches(&self, bank: &str) -> bool {
        match self {
            Self::All => true,
            Self::Bank(wanted) => wanted == bank,
        }
    }
}

/// Count and total of one customer's rows in a single ledger
pub fn summarize_entries(bank: &str, entries: &[LedgerEntry], customer_id: i64) -> TransactionSummary {
    let (total_trxns, total_amount) = entries
        .iter()
        .filter(|e| e.customer_id == customer_id)
        .fold((0i64, 0.0f64), |(count, sum), e| {
            (count + 1, sum + e.amount.unwrap_or(0.0))
        });

    TransactionSummary {
        bank: bank.to_string(),
        total_trxns,
        total_amount,
    }
}

/// Per-bank summaries for a customer over the ledgers of `year`
///
/// A ledger that can't be read or decoded fails the whole request.
pub fn summarize_customer(
    store: &dyn ObjectStore,
    ledger_bucket: &str,
    customer_id: i64,
    year: i32,
    filter: &BankFilter,
) -> Result<Vec<TransactionSummary>> {
    let mut summaries = Vec::new();

    for object in store.list(ledger_bucket, &ledger::year_prefix(year))? {
        let Some(bank) = ledger::bank_from_key(&object.key) else {
            continue;
        };
        if !filter.matches(bank) {
            continue;
        }

        let entries = ledger::read_ledger(store, ledger_bucket, &object.key)?;
        let summary = summarize_entries(bank, &entries, customer_id);
        debug!(
            customer_id,
            year,
            bank,
            rows = entries.len(),
            matched = summary.total_trxns,
            "Aggregated ledger"
        );
        summaries.push(summary);
    }

    Ok(summaries)
}

/// Customer record plus transaction summaries
///
/// The customer must exist: a missing customer is `Error::NotFound`, checked
/// before any ledger is read.
pub fn customer_with_summary(
    db: &Database,
    store: &dyn ObjectStore,
    ledger_bucket: &str,
    customer_id: i64,
    year: i32,
    filter: &BankFilter,
) -> Result<CustomerWithSummary> {
    let customer = db
        .get_customer(customer_id)?
        .ok_or_else(|| Error::NotFound(format!("Customer {} not found", customer_id)))?;

    let trxn_summary = summarize_customer(store, ledger_bucket, customer_id, year, filter)?;

    Ok(CustomerWithSummary {
        customer,
        trxn_summary,
    })
}
