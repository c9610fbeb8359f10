//! Authentication-related handlers

use axum::{Extension, Json};
use serde::Serialize;

use crate::{Identity, Role};

/// Response for the /api/me endpoint
#[derive(Serialize)]
pub struct MeResponse {
    /// The authenticated user's email or identifier
    pub user: String,
    pub role: Role,
    /// How the user was authenticated
    pub auth_method: String,
}

/// Get the currently authenticated user
pub async fn get_me(Extension(identity): Extension<Identity>) -> Json<MeResponse> {
    Json(MeResponse {
        user: identity.user,
        role: identity.role,
        auth_method: identity.auth_method,
    })
}
