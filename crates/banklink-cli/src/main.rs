//! Banklink CLI - Bank customer identity resolution
//!
//! Usage:
//!   banklink init                               Initialize database
//!   banklink serve --port 3000                  Start web server
//!   banklink ingest --key 2024__acme.xlsx       Run one ingestion
//!   banklink customer 42 --year 2024            Customer with transaction summaries
//!   banklink recover                            Fail uploads left by a killed run

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use banklink_core::StorageConfig;
use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
        Commands::Ingest { bucket, key } => commands::cmd_ingest(
            &cli.db,
            &StorageConfig::from_env(),
            bucket.as_deref(),
            &key,
            cli.no_encrypt,
        ),
        Commands::Uploads => commands::cmd_uploads(&cli.db, cli.no_encrypt),
        Commands::Customers {
            filter,
            offset,
            limit,
            json,
        } => commands::cmd_customers(&cli.db, filter, offset, limit, json, cli.no_encrypt),
        Commands::Customer {
            id,
            year,
            bank,
            json,
        } => commands::cmd_customer(
            &cli.db,
            &StorageConfig::from_env(),
            id,
            year,
            &bank,
            json,
            cli.no_encrypt,
        ),
        Commands::Upload {
            server,
            token,
            year,
            bank,
            file,
        } => commands::cmd_upload(&server, token.as_deref(), year, &bank, &file).await,
        Commands::Status => {
            commands::cmd_status(&cli.db, &StorageConfig::from_env(), cli.no_encrypt)
        }
        Commands::Recover => commands::cmd_recover(&cli.db, cli.no_encrypt),
    }
}
