//! Object storage with pluggable backends
//!
//! Source spreadsheets and published ledgers live in an object store
//! addressed by `(bucket, key)`. Keys are `/`-separated relative paths.
//!
//! # Architecture
//!
//! - `ObjectStore` trait defines the interface for storage backends
//! - `LocalObjectStore` keeps objects under `{root}/{bucket}/{key}`
//! - `UploadSigner` issues and checks time-limited write URLs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod local;
mod signing;

pub use local::LocalObjectStore;
pub use signing::{SignedUrl, SigningConfig, UploadSigner, SIGNING_KEY_ENV};

/// Environment variable for the object store root directory
pub const STORAGE_ROOT_ENV: &str = "BANKLINK_STORAGE_ROOT";
/// Environment variable for the bucket receiving source spreadsheets
pub const RAW_BUCKET_ENV: &str = "BANKLINK_RAW_BUCKET";
/// Environment variable for the bucket holding published ledgers
pub const LEDGER_BUCKET_ENV: &str = "BANKLINK_LEDGER_BUCKET";

pub const DEFAULT_RAW_BUCKET: &str = "banks-raw";
pub const DEFAULT_LEDGER_BUCKET: &str = "banks";

/// Metadata about a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Trait for object storage backends
pub trait ObjectStore: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &str;

    /// Store an object, atomically replacing any previous one at the key
    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Read a whole object
    ///
    /// A missing object is `Error::NotFound`.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Remove an object; removing a missing object is not an error
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Objects whose key starts with `prefix`, sorted by key
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.get(bucket, key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject bucket names and keys that could escape the store
pub fn validate_location(bucket: &str, key: &str) -> Result<()> {
    let bad_segment = |s: &str| s.is_empty() || s == "." || s == "..";

    if bucket.contains(['/', '\\']) || bad_segment(bucket) {
        return Err(Error::InvalidKey(format!("Invalid bucket name: {:?}", bucket)));
    }
    if key.contains('\\') || key.split('/').any(bad_segment) {
        return Err(Error::InvalidKey(format!("Invalid object key: {:?}", key)));
    }
    Ok(())
}

/// Where objects live and which buckets the pipeline uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub raw_bucket: String,
    pub ledger_bucket: String,
}

impl StorageConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let root = std::env::var(STORAGE_ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_storage_root());
        let raw_bucket =
            std::env::var(RAW_BUCKET_ENV).unwrap_or_else(|_| DEFAULT_RAW_BUCKET.to_string());
        let ledger_bucket =
            std::env::var(LEDGER_BUCKET_ENV).unwrap_or_else(|_| DEFAULT_LEDGER_BUCKET.to_string());

        Self {
            root,
            raw_bucket,
            ledger_bucket,
        }
    }

    /// Same buckets as the defaults, rooted elsewhere
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            raw_bucket: DEFAULT_RAW_BUCKET.to_string(),
            ledger_bucket: DEFAULT_LEDGER_BUCKET.to_string(),
        }
    }

    /// Open the local store this config points at
    pub fn open(&self) -> Result<LocalObjectStore> {
        LocalObjectStore::new(&self.root)
    }
}

/// Default object store directory
pub fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("banklink")
        .join("storage")
}
