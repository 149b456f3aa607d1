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

//! Token issuance.
//!
//! Mints scoped tokens with the renewal credential. Granted capabilities are
//! recorded as token metadata: only capabilities set to `true` appear, each
//! as the string `"true"`. A denied capability and an unrequested one look
//! the same to the backend.

use crate::backend::{CreateTokenRequest, Metadata, SecretBackend};
use crate::credentials::{BearerToken, CredentialState};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Default ttl of issued tokens.
pub const DEFAULT_TOKEN_TTL: &str = "1h";

/// Caller-requested capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub list: bool,
}

impl Permissions {
    /// Capability names paired with their flag.
    pub fn capabilities(&self) -> [(&'static str, bool); 5] {
        [
            ("create", self.create),
            ("read", self.read),
            ("update", self.update),
            ("delete", self.delete),
            ("list", self.list),
        ]
    }

    /// Token metadata for these permissions.
    pub fn to_metadata(&self) -> Metadata {
        self.capabilities()
            .into_iter()
            .filter(|(_, granted)| *granted)
            .map(|(name, _)| (name.to_string(), "true".to_string()))
            .collect()
    }
}

/// A freshly minted token. Not retained by the broker.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: BearerToken,
    pub display_name: String,
    pub ttl: String,
    pub metadata: Metadata,
}

/// Issues tokens on behalf of callers.
pub struct TokenIssuer {
    backend: Arc<dyn SecretBackend>,
    state: Arc<CredentialState>,
    default_ttl: String,
}

impl TokenIssuer {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        state: Arc<CredentialState>,
        default_ttl: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            state,
            default_ttl: default_ttl.into(),
        }
    }

    /// Issue a token with the default ttl.
    pub async fn issue(&self, display_name: &str, permissions: &Permissions) -> Result<IssuedToken> {
        self.issue_with_ttl(display_name, permissions, &self.default_ttl)
            .await
    }

    /// Issue a token with an explicit ttl (Vault duration string).
    ///
    /// An empty display name is rejected before the backend is contacted.
    /// Otherwise the name is sent exactly as given.
    pub async fn issue_with_ttl(
        &self,
        display_name: &str,
        permissions: &Permissions,
        ttl: &str,
    ) -> Result<IssuedToken> {
        if display_name.trim().is_empty() {
            return Err(Error::Validation("token name is required".to_string()));
        }

        let auth_token = self.state.token();
        let request = CreateTokenRequest {
            display_name: display_name.to_string(),
            ttl: ttl.to_string(),
            meta: permissions.to_metadata(),
        };

        info!(
            display_name = %request.display_name,
            ttl = %request.ttl,
            metadata = ?request.meta,
            "Token creation requested"
        );

        let token = self
            .backend
            .create_token(&auth_token, &request)
            .await
            .inspect_err(|e| {
                error!(
                    display_name = %request.display_name,
                    status = e.backend_status(),
                    error = %e,
                    "Token creation failed"
                );
            })?;

        info!(display_name = %request.display_name, token = %token, "Token created");

        Ok(IssuedToken {
            token,
            display_name: request.display_name,
            ttl: request.ttl,
            metadata: request.meta,
        })
    }
}
