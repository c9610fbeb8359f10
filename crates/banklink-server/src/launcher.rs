//! Ingestion trigger
//!
//! Fired once per newly written source object. Each launch becomes one
//! blocking task running the pipeline to completion; there is no retry.

use tokio::task::JoinHandle;
use tracing::{error, info};

use banklink_core::Ingestor;

#[derive(Clone)]
pub struct IngestLauncher {
    ingestor: Ingestor,
}

impl IngestLauncher {
    pub fn new(ingestor: Ingestor) -> Self {
        Self { ingestor }
    }

    pub fn is_running(&self, year: i32, bank: &str) -> bool {
        self.ingestor.is_running(year, bank)
    }

    /// Start one run for `bucket/key` and return immediately
    ///
    /// Failures are recorded on the upload by the pipeline and logged here.
    pub fn launch(&self, bucket: &str, key: &str) -> JoinHandle<()> {
        let ingestor = self.ingestor.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();

        info!(bucket = %bucket, key = %key, "Launching ingestion");
        tokio::task::spawn_blocking(move || match ingestor.run(&bucket, &key) {
            Ok(report) => info!(
                year = report.year,
                bank = %report.bank,
                rows = report.rows,
                customers_created = report.customers_created,
                ledger = %report.ledger_key,
                "Background ingestion finished"
            ),
            Err(e) => error!(bucket = %bucket, key = %key, error = %e, "Background ingestion failed"),
        })
    }
}
