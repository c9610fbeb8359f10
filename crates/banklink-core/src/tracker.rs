//! Upload state tracker
//!
//! The lifecycle of one (year, bank) ingestion is a pure transition function:
//!
//! ```text
//! Pending ──Started──▶ InProgress ──Progressed──▶ InProgress
//!                          │
//!                          ├──Completed──▶ Completed (100%)
//!                          └──Failed─────▶ Failed (0%, message = error)
//! ```
//!
//! Transitions are not validated. Any event applies to any state, matching
//! the last-write-wins persistence of the uploads table. Persisting a state
//! is the caller's job (see [`crate::ingest::UploadStore`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::UploadStatus;

/// Snapshot of an upload's status, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadState {
    pub status: UploadStatus,
    pub progress: i64,
    pub message: String,
}

impl UploadState {
    pub fn pending() -> Self {
        Self {
            status: UploadStatus::Pending,
            progress: 0,
            message: String::new(),
        }
    }
}

impl Default for UploadState {
    fn default() -> Self {
        Self::pending()
    }
}

/// Checkpoints reported by an ingestion run
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A client reserved the slot
    Reserved,
    /// Row processing began
    Started,
    /// `processed` of `total` rows are done
    Progressed {
        processed: usize,
        total: usize,
        elapsed: Duration,
    },
    /// The ledger was published
    Completed { elapsed: Duration },
    /// The run aborted
    Failed { error: String },
}

fn minutes(elapsed: Duration) -> String {
    format!("{:.2} mins", elapsed.as_secs_f64() / 60.0)
}

/// Integer percentage of rows processed, floored
pub fn percent(processed: usize, total: usize) -> i64 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) as u128 * 100) / total as u128) as i64
}

/// Apply one event, producing the next state
pub fn apply(state: UploadState, event: UploadEvent) -> UploadState {
    match event {
        UploadEvent::Reserved => UploadState::pending(),
        UploadEvent::Started => UploadState {
            status: UploadStatus::InProgress,
            progress: 0,
            message: "Started processing".to_string(),
        },
        UploadEvent::Progressed {
            processed,
            total,
            elapsed,
        } => UploadState {
            status: UploadStatus::InProgress,
            // Progress never moves backwards within a run
            progress: match state.status {
                UploadStatus::InProgress => percent(processed, total).max(state.progress),
                _ => percent(processed, total),
            },
            message: format!(
                "Processed {} of {} rows: elapsed {}",
                processed,
                total,
                minutes(elapsed)
            ),
        },
        UploadEvent::Completed { elapsed } => UploadState {
            status: UploadStatus::Completed,
            progress: 100,
            message: format!("Processing completed: elapsed {}", minutes(elapsed)),
        },
        UploadEvent::Failed { error } => UploadState {
            status: UploadStatus::Failed,
            progress: 0,
            message: format!("Processing failed: {}", error),
        },
    }
}

/// Which processed-row counts trigger a progress update
///
/// Every `ceil(total / 10)` rows, and always on the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSchedule {
    total: usize,
    step: usize,
}

impl ProgressSchedule {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            step: total.div_ceil(10).max(1),
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// `processed` is 1-based: the number of rows finished so far
    pub fn is_checkpoint(&self, processed: usize) -> bool {
        processed > 0 && (processed % self.step == 0 || processed == self.total)
    }
}
