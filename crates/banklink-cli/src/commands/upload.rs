//! Upload a bank sheet through a running server

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable with the bearer token for `upload`
pub const TOKEN_ENV: &str = "BANKLINK_TOKEN";

#[derive(Debug, Deserialize)]
struct Reservation {
    url: String,
    key: String,
    expires: i64,
}

#[derive(Debug, Deserialize)]
struct Stored {
    size: usize,
    ingesting: bool,
}

/// Reserve a signed URL, then PUT the sheet to it
///
/// Ingestion runs on the server; follow it with `banklink uploads` or
/// `GET /api/uploads`.
pub async fn cmd_upload(
    server: &str,
    token: Option<&str>,
    year: i32,
    bank: &str,
    file: &Path,
) -> Result<()> {
    let is_xlsx = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        bail!("Only .xlsx sheets can be uploaded: {}", file.display());
    }

    let token = match token {
        Some(t) => t.to_string(),
        None => std::env::var(TOKEN_ENV)
            .with_context(|| format!("Pass --token or set {}", TOKEN_ENV))?,
    };

    let body = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    println!("📤 Uploading {} ({} bytes) for {} {}...", file.display(), body.len(), year, bank);

    let client = reqwest::Client::new();
    let reserve_url = format!("{}/api/uploads/ingest", server.trim_end_matches('/'));
    let response = client
        .post(&reserve_url)
        .bearer_auth(&token)
        .json(&serde_json::json!({ "year": year, "bank": bank }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", reserve_url))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("Reservation failed ({}): {}", status, text);
    }
    let reservation: Reservation = response
        .json()
        .await
        .context("Unexpected reservation response")?;
    tracing::debug!(key = %reservation.key, expires = reservation.expires, "Upload reserved");

    let response = client
        .put(&reservation.url)
        .body(body)
        .send()
        .await
        .context("Failed to upload sheet")?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("Upload failed ({}): {}", status, text);
    }
    let stored: Stored = response.json().await.context("Unexpected upload response")?;

    println!("✅ Stored {} ({} bytes)", reservation.key, stored.size);
    if stored.ingesting {
        println!("   Ingestion started. Check progress with: banklink uploads");
    }

    Ok(())
}
