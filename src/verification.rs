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

//! Token verification.
//!
//! A presented token is valid exactly when the backend accepts it as the
//! bearer of its own `lookup-self` call. No local validation is done.

use crate::backend::{SecretBackend, TokenAttributes};
use crate::credentials::BearerToken;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of verifying a presented token.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Valid(TokenAttributes),
    Invalid,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn attributes(&self) -> Option<&TokenAttributes> {
        match self {
            Verification::Valid(attrs) => Some(attrs),
            Verification::Invalid => None,
        }
    }

    pub fn into_attributes(self) -> Option<TokenAttributes> {
        match self {
            Verification::Valid(attrs) => Some(attrs),
            Verification::Invalid => None,
        }
    }
}

/// Verifies caller-presented tokens against the backend.
pub struct TokenVerifier {
    backend: Arc<dyn SecretBackend>,
}

impl TokenVerifier {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    /// Ask the backend whether `presented` is currently valid.
    pub async fn verify(&self, presented: &BearerToken) -> Verification {
        info!(token = %presented, "Token verification started");

        match self.backend.lookup_self(presented).await {
            Ok(attrs) => {
                info!(token = %presented, "Token verification succeeded");
                Verification::Valid(attrs)
            }
            Err(e) => {
                warn!(
                    token = %presented,
                    status = e.backend_status(),
                    error = %e,
                    "Token verification failed"
                );
                Verification::Invalid
            }
        }
    }
}
