//! Server command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use banklink_core::{ObjectStore, SigningConfig, StorageConfig, UploadSigner};
use banklink_server::{AppState, ServerConfig, API_KEYS_ENV, JWT_SECRET_ENV};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    let storage = StorageConfig::from_env();
    let config = ServerConfig::from_env(!no_auth);

    println!("🚀 Starting banklink server...");
    println!("   Database: {}", db_path.display());
    println!("   Storage: {}", storage.root.display());
    println!(
        "   Buckets: {} (sheets), {} (ledgers)",
        storage.raw_bucket, storage.ledger_bucket
    );
    println!("   Listening: http://{}:{}", host, port);

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        if !config.api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured ({})",
                config.api_keys.len(),
                API_KEYS_ENV
            );
        }
        if config.jwt_secret.is_some() {
            println!("   🔐 Bearer JWTs: enabled ({})", JWT_SECRET_ENV);
        }
        if config.api_keys.is_empty() && config.jwt_secret.is_none() {
            println!(
                "   ❌ No credentials configured: set {} or {}",
                API_KEYS_ENV, JWT_SECRET_ENV
            );
        }
    }

    let signer = match SigningConfig::from_env().and_then(|c| UploadSigner::new(&c)) {
        Ok(signer) => {
            println!("   ✍️  Upload URLs valid for {}s", signer.ttl_secs());
            Some(signer)
        }
        Err(e) => {
            println!("   ⚠️  Uploads disabled: {}", e);
            None
        }
    };
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;
    let store: Arc<dyn ObjectStore> = Arc::new(
        storage
            .open()
            .with_context(|| format!("Failed to open object store at {}", storage.root.display()))?,
    );

    let state = AppState::new(db, store, storage, signer, config);
    banklink_server::serve_with_config(state, host, port).await?;

    Ok(())
}
