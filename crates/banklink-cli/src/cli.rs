//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Banklink - Resolve bank customers and summarize their transactions
#[derive(Parser)]
#[command(name = "banklink")]
#[command(about = "Bank spreadsheet ingestion and customer identity resolution", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "banklink.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set BANKLINK_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, every /api route needs a bearer API key or JWT.
        #[arg(long)]
        no_auth: bool,
    },

    /// Run one ingestion for a stored source sheet
    ///
    /// The worker entry point: reads `{year}__{bank}.xlsx` (or .csv) from the
    /// bucket, resolves every row and publishes the year's ledger for the bank.
    Ingest {
        /// Source bucket (defaults to BANKLINK_RAW_BUCKET)
        #[arg(long)]
        bucket: Option<String>,

        /// Source object key, e.g. 2024__acme.xlsx
        #[arg(long)]
        key: String,
    },

    /// List uploads and their progress
    Uploads,

    /// Search customers
    Customers {
        #[command(flatten)]
        filter: CustomerFilterArgs,

        /// Skip this many matches
        #[arg(long, default_value = "0")]
        offset: i64,

        /// Page size (max 1000)
        #[arg(short, long, default_value = "10")]
        limit: i64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one customer with per-bank transaction summaries
    Customer {
        /// Customer ID
        id: i64,

        /// Ledger year (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,

        /// Bank name, or "all"
        #[arg(long, default_value = "all")]
        bank: String,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Upload a bank sheet through a running server
    ///
    /// Reserves a signed URL with POST /api/uploads/ingest, then PUTs the file.
    /// Needs a superuser token (--token or BANKLINK_TOKEN).
    Upload {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Bearer token (API key or JWT)
        #[arg(long)]
        token: Option<String>,

        /// Year the sheet covers
        #[arg(long)]
        year: i32,

        /// Bank name
        #[arg(long)]
        bank: String,

        /// The .xlsx sheet to upload
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show database, storage and upload status
    Status,

    /// Mark uploads left in progress by a killed run as failed
    ///
    /// Only run this while no server or ingest process is working; the
    /// sheets can then be uploaded again.
    Recover,
}

/// Substring filters shared by customer searches
#[derive(Args, Debug, Default)]
pub struct CustomerFilterArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub mobile_no: Option<String>,
    #[arg(long)]
    pub tax_id: Option<String>,
    #[arg(long)]
    pub tin: Option<String>,
    #[arg(long)]
    pub rc: Option<String>,
}
