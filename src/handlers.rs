/*
 * Copyright Nitro Agility S.r.l.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! HTTP handlers.
//!
//! Token issuance, a token-protected sample resource, and health.

use crate::backend::SecretBackend;
use crate::credentials::{BearerToken, CredentialState};
use crate::error::Error;
use crate::issuance::{Permissions, TokenIssuer};
use crate::verification::TokenVerifier;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the caller's token on protected routes.
pub const TOKEN_HEADER: &str = "Token-Header";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<TokenVerifier>,
    pub credentials: Arc<CredentialState>,
    pub vault_addr: Arc<str>,
}

impl AppState {
    /// Wire the issuance and verification services onto one backend.
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        credentials: Arc<CredentialState>,
        vault_addr: &str,
        token_ttl: &str,
    ) -> Self {
        Self {
            issuer: Arc::new(TokenIssuer::new(
                backend.clone(),
                credentials.clone(),
                token_ttl,
            )),
            verifier: Arc::new(TokenVerifier::new(backend)),
            credentials,
            vault_addr: Arc::from(vault_addr),
        }
    }
}

// ============================================================================
// Token Issuance
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTokenBody {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` and absent both mean no capabilities
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub message: String,
}

impl CreateTokenResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            token: None,
            message: message.into(),
        }
    }
}

/// POST /api/token/create
pub async fn create_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateTokenBody>, JsonRejection>,
) -> (StatusCode, Json<CreateTokenResponse>) {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed token creation request");
            return (
                StatusCode::BAD_REQUEST,
                Json(CreateTokenResponse::failure(format!(
                    "Invalid request body: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    let name = match req.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(CreateTokenResponse::failure("name is required")),
            );
        }
    };

    let permissions = req.permissions.unwrap_or_default();
    match state.issuer.issue(name, &permissions).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(CreateTokenResponse {
                success: true,
                token: Some(issued.token.expose().to_string()),
                message: "Token created successfully".to_string(),
            }),
        ),
        Err(e) => (
            e.status_code(),
            Json(CreateTokenResponse::failure(format!(
                "Token creation failed: {}",
                e
            ))),
        ),
    }
}

// ============================================================================
// Protected Resource
// ============================================================================

/// GET /api/data
pub async fn get_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let header = headers
        .get(TOKEN_HEADER)
        .filter(|value| !value.as_bytes().trim_ascii().is_empty());

    let Some(header) = header else {
        let err = Error::Unauthorized(format!("missing {} header", TOKEN_HEADER));
        warn!(error = %err, "Request without token");
        return (
            err.status_code(),
            Json(json!({
                "error": "Token is required",
                "message": format!("The {} header is required", TOKEN_HEADER),
            })),
        );
    };

    // Undecodable bytes cannot be forwarded to the backend as a header value.
    let Some(presented) = header
        .to_str()
        .ok()
        .and_then(|value| BearerToken::new(value).ok())
    else {
        let err = Error::Forbidden(format!("undecodable {} header", TOKEN_HEADER));
        warn!(error = %err, "Access attempt with malformed token");
        return invalid_token(err);
    };

    let Some(attrs) = state.verifier.verify(&presented).await.into_attributes() else {
        let err = Error::Forbidden("token rejected by backend".to_string());
        warn!(token = %presented, error = %err, "Access attempt with invalid token");
        return invalid_token(err);
    };

    let user = attrs.display_name.as_deref().unwrap_or("unknown");
    info!(user = %user, "Protected resource served");

    let timestamp = attrs
        .creation_time
        .map(serde_json::Value::from)
        .unwrap_or_else(|| json!("unknown"));

    (
        StatusCode::OK,
        Json(json!({
            "message": "Success!",
            "data": {
                "result": "Your API result here",
                "timestamp": timestamp,
                "user": user,
                "ttl": attrs.ttl,
                "permissions": attrs.meta,
            }
        })),
    )
}

fn invalid_token(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        err.status_code(),
        Json(json!({
            "error": "Invalid token",
            "message": "The token is invalid or expired",
        })),
    )
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub vault_addr: String,
    pub renewal_token_status: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        vault_addr: state.vault_addr.to_string(),
        renewal_token_status: state.credentials.token().fingerprint(),
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "The requested endpoint was not found",
        })),
    )
}
