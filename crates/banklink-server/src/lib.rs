//! Banklink Web Server
//!
//! Axum-based REST API for the banklink ingestion service.
//!
//! Security features:
//! - Bearer authentication (API keys or HS256 JWTs), secure by default
//! - Role checks: only superusers may reserve uploads
//! - Signed URLs for object writes, so uploaders never hold an API credential
//! - Restrictive CORS policy and security headers
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use banklink_core::{Database, Error as CoreError, ObjectStore, StorageConfig, UploadSigner};

mod handlers;
mod launcher;

pub use launcher::IngestLauncher;

/// Maximum accepted size of an uploaded sheet (100MB)
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Maximum page size for list endpoints
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Environment variable with `key:user:role` API key triples
pub const API_KEYS_ENV: &str = "BANKLINK_API_KEYS";

/// Environment variable with the HS256 secret for bearer JWTs
pub const JWT_SECRET_ENV: &str = "BANKLINK_JWT_SECRET";

const AUTHORIZATION_HEADER: &str = "authorization";

/// What an authenticated caller may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read customers and uploads
    Staff,
    /// Everything staff can do, plus reserving uploads
    Superuser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Superuser => "superuser",
        }
    }

    /// Highest role granted by a list of group names
    pub fn from_groups<S: AsRef<str>>(groups: &[S]) -> Option<Self> {
        let has = |name: &str| groups.iter().any(|g| g.as_ref().eq_ignore_ascii_case(name));
        if has("superuser") {
            Some(Self::Superuser)
        } else if has("staff") {
            Some(Self::Staff)
        } else {
            None
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "superuser" => Ok(Self::Superuser),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The caller behind a request, attached by the auth middleware
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub user: String,
    pub role: Role,
    /// How the caller was authenticated (`none`, `api_key`, `jwt`)
    pub auth_method: String,
}

/// A static API key for internal services
#[derive(Clone)]
pub struct ApiKey {
    pub key: String,
    pub user: String,
    pub role: Role,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("user", &self.user)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Parse comma-separated `key:user:role` entries
///
/// A bare `key` authenticates as user `api-key` with the staff role.
/// Entries with an unknown role are skipped with a warning.
pub fn parse_api_keys(input: &str) -> Vec<ApiKey> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let key = parts.next().unwrap_or_default().trim();
            let user = parts.next().map(str::trim).filter(|u| !u.is_empty());
            let role = match parts.next() {
                Some(raw) => match raw.parse::<Role>() {
                    Ok(role) => role,
                    Err(e) => {
                        warn!(error = %e, "Skipping API key entry");
                        return None;
                    }
                },
                None => Role::Staff,
            };
            if key.is_empty() {
                return None;
            }
            Some(ApiKey {
                key: key.to_string(),
                user: user.unwrap_or("api-key").to_string(),
                role,
            })
        })
        .collect()
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys for internal service authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<ApiKey>,
    /// HS256 secret for bearer JWTs; JWTs are rejected when unset
    pub jwt_secret: Option<String>,
    /// Largest accepted object body in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            jwt_secret: None,
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Read API keys and the JWT secret from the environment
    pub fn from_env(require_auth: bool) -> Self {
        Self {
            require_auth,
            api_keys: parse_api_keys(&std::env::var(API_KEYS_ENV).unwrap_or_default()),
            jwt_secret: std::env::var(JWT_SECRET_ENV)
                .ok()
                .filter(|s| !s.is_empty()),
            ..Default::default()
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub store: Arc<dyn ObjectStore>,
    /// Bucket names; `root` is informational once the store is open
    pub storage: StorageConfig,
    /// Upload URL signer; reservations and object writes are refused without it
    pub signer: Option<UploadSigner>,
    pub launcher: IngestLauncher,
    pub config: ServerConfig,
}

impl AppState {
    /// Wire state together; ingestion runs share the process-wide guard
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        storage: StorageConfig,
        signer: Option<UploadSigner>,
        config: ServerConfig,
    ) -> Self {
        let launcher = IngestLauncher::new(banklink_core::Ingestor::new(
            db.clone(),
            store.clone(),
            storage.ledger_bucket.clone(),
        ));
        Self {
            db,
            store,
            storage,
            signer,
            launcher,
            config,
        }
    }

    /// Replace the launcher (tests use one with a private guard)
    pub fn with_launcher(mut self, launcher: IngestLauncher) -> Self {
        self.launcher = launcher;
        self
    }
}

/// Authentication middleware - validates bearer API keys or JWTs
///
/// On success the caller's [`Identity`] is stored in the request extensions.
///
/// # Security Notes
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
///
/// **JWTs**: HS256 with the configured secret; `exp` is required. The role
/// comes from the `groups` claim, and a token with neither `staff` nor
/// `superuser` is refused with 403.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        request.extensions_mut().insert(Identity {
            user: "local-dev".to_string(),
            role: Role::Superuser,
            auth_method: "none".to_string(),
        });
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    let Some(token) = token else {
        warn!(path = %request.uri().path(), "Unauthorized request - no bearer token");
        return AppError::unauthorized("Authentication required").into_response();
    };

    // Check for API key first
    if let Some(api_key) = validate_api_key(&token, &state.config.api_keys) {
        info!(user = %api_key.user, path = %request.uri().path(), "Authenticated via API key");
        request.extensions_mut().insert(Identity {
            user: api_key.user.clone(),
            role: api_key.role,
            auth_method: "api_key".to_string(),
        });
        return next.run(request).await;
    }

    if let Some(secret) = state.config.jwt_secret.as_deref() {
        match validate_jwt(&token, secret) {
            Ok(identity) => {
                info!(user = %identity.user, role = identity.role.as_str(), path = %request.uri().path(), "Authenticated via JWT");
                request.extensions_mut().insert(identity);
                return next.run(request).await;
            }
            Err(JwtRejection::NoRole(user)) => {
                warn!(user = %user, path = %request.uri().path(), "JWT carries no banklink role");
                return AppError::forbidden("No banklink role assigned").into_response();
            }
            Err(JwtRejection::Invalid(e)) => {
                warn!(error = %e, path = %request.uri().path(), "Invalid JWT");
            }
        }
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    AppError::unauthorized("Authentication required").into_response()
}

enum JwtRejection {
    Invalid(String),
    NoRole(String),
}

/// Validate an HS256 bearer JWT and derive the caller's identity
fn validate_jwt(token: &str, secret: &str) -> Result<Identity, JwtRejection> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[derive(Deserialize)]
    struct Claims {
        sub: String,
        email: Option<String>,
        #[serde(default)]
        groups: Vec<String>,
    }

    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| JwtRejection::Invalid(format!("JWT validation failed: {}", e)))?;

    let claims = token_data.claims;
    let user = claims.email.unwrap_or(claims.sub);
    let role = Role::from_groups(&claims.groups).ok_or_else(|| JwtRejection::NoRole(user.clone()))?;

    Ok(Identity {
        user,
        role,
        auth_method: "jwt".to_string(),
    })
}

/// Find the API key matching `provided` using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key<'a>(provided: &str, valid_keys: &'a [ApiKey]) -> Option<&'a ApiKey> {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    let mut matched = None;
    for api_key in valid_keys {
        let key_bytes = api_key.key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            matched = Some(api_key);
        }
    }
    matched
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let config = state.config.clone();

    let api_routes = Router::new()
        // Auth
        .route("/me", get(handlers::get_me))
        // Uploads
        .route("/uploads", get(handlers::list_uploads))
        .route("/uploads/ingest", post(handlers::reserve_upload))
        // Customers
        .route("/customers", get(handlers::list_customers))
        .route("/customers/:id", get(handlers::get_customer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health and signed object writes sit outside bearer auth
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/objects/:bucket/*key",
            put(handlers::put_object).layer(DefaultBodyLimit::max(config.max_upload_size)),
        );

    // Build CORS layer
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

/// Start the server
pub async fn serve_with_config(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    if !state.config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }
    if state.signer.is_none() {
        warn!("Upload signing not configured: reservations and object writes are disabled");
    }

    let app = create_router(state).into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn with_status(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn unavailable(msg: &str) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Client-caused core errors keep their message
        match err.downcast_ref::<CoreError>() {
            Some(CoreError::NotFound(msg)) => return Self::not_found(msg),
            Some(CoreError::InvalidKey(msg)) | Some(CoreError::InvalidData(msg)) => {
                return Self::bad_request(msg)
            }
            Some(CoreError::Conflict(msg)) => return Self::conflict(msg),
            Some(CoreError::Signature(msg)) => return Self::forbidden(msg),
            _ => {}
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
