//! Transaction ledgers
//!
//! One ledger per (year, bank), stored at `{year}/{bank}.ledger` in the
//! ledger bucket. A ledger keeps one entry per source row, in source order,
//! laid out column by column:
//!
//! ```json
//! {"version":1,"customer_id":[7,9],"trxn_amount":[100.0,null],"trxn_date":["2024-01-02",null]}
//! ```
//!
//! The JSON is gzip compressed with a zeroed header timestamp, so the same
//! entries always encode to the same bytes.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::ObjectStore;

/// File extension of published ledgers
pub const LEDGER_EXTENSION: &str = "ledger";

const FORMAT_VERSION: u32 = 1;

/// One source row, resolved to a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub customer_id: i64,
    pub amount: Option<f64>,
    pub date: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Columns {
    version: u32,
    customer_id: Vec<i64>,
    trxn_amount: Vec<Option<f64>>,
    trxn_date: Vec<Option<String>>,
}

/// Object key of the ledger for one (year, bank)
pub fn ledger_key(year: i32, bank: &str) -> String {
    format!("{}/{}.{}", year, bank, LEDGER_EXTENSION)
}

/// Key prefix shared by every ledger of a year
pub fn year_prefix(year: i32) -> String {
    format!("{}/", year)
}

/// Bank name encoded in a ledger key, `None` for keys that aren't ledgers
pub fn bank_from_key(key: &str) -> Option<&str> {
    let (_, file) = key.rsplit_once('/')?;
    file.strip_suffix(LEDGER_EXTENSION)?
        .strip_suffix('.')
        .filter(|bank| !bank.is_empty())
}

/// Serialize entries into the compressed columnar format
pub fn encode(entries: &[LedgerEntry]) -> Result<Vec<u8>> {
    let columns = Columns {
        version: FORMAT_VERSION,
        customer_id: entries.iter().map(|e| e.customer_id).collect(),
        trxn_amount: entries.iter().map(|e| e.amount).collect(),
        trxn_date: entries.iter().map(|e| e.date.clone()).collect(),
    };
    let json = serde_json::to_vec(&columns)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Parse a compressed ledger back into entries
pub fn decode(bytes: &[u8]) -> Result<Vec<LedgerEntry>> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| Error::CorruptLedger(e.to_string()))?;

    let columns: Columns = serde_json::from_slice(&json)?;
    if columns.version != FORMAT_VERSION {
        return Err(Error::CorruptLedger(format!(
            "unsupported version {}",
            columns.version
        )));
    }

    let rows = columns.customer_id.len();
    if columns.trxn_amount.len() != rows || columns.trxn_date.len() != rows {
        return Err(Error::CorruptLedger(
            "columns have different lengths".to_string(),
        ));
    }

    Ok(columns
        .customer_id
        .into_iter()
        .zip(columns.trxn_amount)
        .zip(columns.trxn_date)
        .map(|((customer_id, amount), date)| LedgerEntry {
            customer_id,
            amount,
            date,
        })
        .collect())
}

/// Accumulates the entries of one run
///
/// Nothing reaches the store until `publish`, which writes the whole ledger
/// in one object replacement.
#[derive(Debug, Default)]
pub struct LedgerWriter {
    entries: Vec<LedgerEntry>,
}

impl LedgerWriter {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            entries: Vec::with_capacity(rows),
        }
    }

    pub fn push(&mut self, customer_id: i64, amount: Option<f64>, date: Option<String>) {
        self.entries.push(LedgerEntry {
            customer_id,
            amount,
            date,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Write the ledger, replacing any previous one for (year, bank)
    ///
    /// Returns the key written.
    pub fn publish(
        self,
        store: &dyn ObjectStore,
        bucket: &str,
        year: i32,
        bank: &str,
    ) -> Result<String> {
        let key = ledger_key(year, bank);
        let bytes = encode(&self.entries)?;
        store.put(bucket, &key, &bytes)?;

        info!(
            bucket,
            key = %key,
            rows = self.entries.len(),
            bytes = bytes.len(),
            "Published ledger"
        );
        Ok(key)
    }
}

/// Read one ledger from the store
pub fn read_ledger(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<Vec<LedgerEntry>> {
    decode(&store.get(bucket, key)?)
}
