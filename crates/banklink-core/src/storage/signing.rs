//! Time-limited upload URLs
//!
//! A signed URL lets a client write exactly one object before it expires,
//! without holding an API credential. The signature is
//! `HMAC-SHA256(key, "PUT\n{bucket}\n{key}\n{expires}")`, hex-encoded.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the HMAC signing key
pub const SIGNING_KEY_ENV: &str = "BANKLINK_SIGNING_KEY";
/// Environment variable overriding the URL lifetime in seconds
pub const UPLOAD_URL_TTL_ENV: &str = "BANKLINK_UPLOAD_URL_TTL";
/// Environment variable with the externally reachable base URL
pub const PUBLIC_URL_ENV: &str = "BANKLINK_PUBLIC_URL";

pub const DEFAULT_TTL_SECS: i64 = 3600;
pub const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:3000";

/// Signing configuration
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub key: String,
    pub ttl_secs: i64,
    pub public_url: String,
}

impl SigningConfig {
    /// Load from environment variables
    ///
    /// The signing key is required; TTL and public URL have defaults.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(SIGNING_KEY_ENV).map_err(|_| {
            Error::Signature(format!("{} environment variable not set", SIGNING_KEY_ENV))
        })?;

        let ttl_secs = match std::env::var(UPLOAD_URL_TTL_ENV) {
            Ok(raw) => raw.parse::<i64>().ok().filter(|t| *t > 0).ok_or_else(|| {
                Error::Signature(format!("Invalid {}: {}", UPLOAD_URL_TTL_ENV, raw))
            })?,
            Err(_) => DEFAULT_TTL_SECS,
        };

        let public_url =
            std::env::var(PUBLIC_URL_ENV).unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string());

        Ok(Self {
            key,
            ttl_secs,
            public_url,
        })
    }
}

/// A write destination handed to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    pub bucket: String,
    pub key: String,
    /// Unix timestamp after which the URL is rejected
    pub expires: i64,
}

/// Issues and checks upload URL signatures
#[derive(Clone)]
pub struct UploadSigner {
    key: Vec<u8>,
    ttl_secs: i64,
    public_url: String,
}

impl std::fmt::Debug for UploadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSigner")
            .field("ttl_secs", &self.ttl_secs)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl UploadSigner {
    pub fn new(config: &SigningConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(Error::Signature("Signing key must not be empty".to_string()));
        }
        Ok(Self {
            key: config.key.as_bytes().to_vec(),
            ttl_secs: config.ttl_secs,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Signature(format!("Invalid key length: {}", e)))?;
        mac.update(format!("PUT\n{}\n{}\n{}", bucket, key, expires).as_bytes());
        Ok(mac)
    }

    /// Hex signature for a PUT of `bucket/key` valid until `expires`
    pub fn signature(&self, bucket: &str, key: &str, expires: i64) -> Result<String> {
        let mac = self.mac(bucket, key, expires)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue a URL valid for the configured TTL from `now` (unix seconds)
    pub fn sign_put(&self, bucket: &str, key: &str, now: i64) -> Result<SignedUrl> {
        super::validate_location(bucket, key)?;
        let expires = now + self.ttl_secs;
        let signature = self.signature(bucket, key, expires)?;
        Ok(SignedUrl {
            url: format!(
                "{}/objects/{}/{}?expires={}&signature={}",
                self.public_url,
                encode_path(bucket),
                encode_path(key),
                expires,
                signature
            ),
            bucket: bucket.to_string(),
            key: key.to_string(),
            expires,
        })
    }

    /// Check a presented signature; comparison is constant-time
    pub fn verify_put(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<()> {
        if now > expires {
            return Err(Error::Signature("Upload URL has expired".to_string()));
        }

        let presented = hex::decode(signature)
            .map_err(|_| Error::Signature("Malformed signature".to_string()))?;

        self.mac(bucket, key, expires)?
            .verify_slice(&presented)
            .map_err(|_| Error::Signature("Signature mismatch".to_string()))
    }
}

/// Percent-encode each `/`-separated segment, keeping the separators
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
