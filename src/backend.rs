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

//! Secret backend client.
//!
//! Talks to Vault's token auth method: `lookup-self`, `renew-self` and
//! `create`. Every failure (transport error, timeout, non-2xx status,
//! undecodable body) collapses into [`Error::Unavailable`].

use crate::credentials::BearerToken;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the bearer credential on every backend call.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Token metadata: flat string-to-string mapping.
pub type Metadata = BTreeMap<String, String>;

/// Attributes the backend reports for a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenAttributes {
    /// Remaining seconds before expiry
    #[serde(default)]
    pub ttl: u64,
    /// Seconds granted at creation or last full renewal
    #[serde(default)]
    pub creation_ttl: u64,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub creation_time: Option<i64>,
    /// Vault sends `null` when a token has no metadata
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Metadata,
}

impl TokenAttributes {
    /// Creation time as a UTC timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Metadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Metadata>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parameters for minting a new token.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTokenRequest {
    pub display_name: String,
    pub ttl: String,
    pub meta: Metadata,
}

/// The three remote operations the broker needs from the secret backend.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Attributes of the presenting token.
    async fn lookup_self(&self, token: &BearerToken) -> Result<TokenAttributes>;

    /// Extend the presenting token's ttl. `Ok` only on explicit acknowledgement.
    async fn renew_self(&self, token: &BearerToken) -> Result<()>;

    /// Mint a new token authenticated by `auth_token`; returns its bearer string.
    async fn create_token(
        &self,
        auth_token: &BearerToken,
        request: &CreateTokenRequest,
    ) -> Result<BearerToken>;
}

// ============================================================================
// Vault wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: TokenAttributes,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    auth: CreateAuth,
}

#[derive(Debug, Deserialize)]
struct CreateAuth {
    client_token: String,
}

// ============================================================================
// Vault HTTP client
// ============================================================================

/// Vault HTTP client.
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    http_client: Client,
}

impl VaultClient {
    /// Create a client for `base_url` with a bounded per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("creating HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, ?timeout, "Vault client initialized");

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Base address of the backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Reachability probe against `sys/health`.
    ///
    /// Any HTTP answer counts as reachable: Vault reports sealed or standby
    /// nodes with non-200 codes.
    pub async fn probe_health(&self) -> Result<u16> {
        let response = self
            .http_client
            .get(self.url("sys/health"))
            .send()
            .await
            .map_err(|e| Error::transport("health", e))?;

        Ok(response.status().as_u16())
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
        token: &BearerToken,
    ) -> Result<reqwest::Response> {
        let response = request
            .header(VAULT_TOKEN_HEADER, token.expose())
            .send()
            .await
            .map_err(|e| {
                warn!(operation, token = %token, error = %e, "Vault request failed");
                Error::transport(operation, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                operation,
                token = %token,
                status = status.as_u16(),
                "Vault returned non-success status"
            );
            return Err(Error::status(operation, status.as_u16()));
        }

        Ok(response)
    }
}

#[async_trait]
impl SecretBackend for VaultClient {
    async fn lookup_self(&self, token: &BearerToken) -> Result<TokenAttributes> {
        const OP: &str = "lookup-self";

        let request = self.http_client.get(self.url("auth/token/lookup-self"));
        let response = self.send(OP, request, token).await?;

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(OP, e))?;

        Ok(body.data)
    }

    async fn renew_self(&self, token: &BearerToken) -> Result<()> {
        let request = self.http_client.post(self.url("auth/token/renew-self"));
        self.send("renew-self", request, token).await?;
        Ok(())
    }

    async fn create_token(
        &self,
        auth_token: &BearerToken,
        request: &CreateTokenRequest,
    ) -> Result<BearerToken> {
        const OP: &str = "create-token";

        let builder = self
            .http_client
            .post(self.url("auth/token/create"))
            .json(request);
        let response = self.send(OP, builder, auth_token).await?;

        let body: CreateResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(OP, e))?;

        BearerToken::new(body.auth.client_token)
            .map_err(|_| Error::transport(OP, "backend returned an empty client token"))
    }
}

// ============================================================================
// Tests
// ============================================================================
