//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db)
//! - `customers` - Customer search and per-customer summaries
//! - `ingest` - Run one ingestion (the worker entry point)
//! - `serve` - Web server command
//! - `status` - Database, storage and upload status
//! - `upload` - Upload a sheet through a running server
//! - `uploads` - Upload progress listing and recovery

pub mod core;
pub mod customers;
pub mod ingest;
pub mod serve;
pub mod status;
pub mod upload;
pub mod uploads;

// Re-export command functions for main.rs
pub use core::*;
pub use customers::*;
pub use ingest::*;
pub use serve::*;
pub use status::*;
pub use upload::*;
pub use uploads::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
