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

//! Renewal credential state.
//!
//! A single lock-guarded slot holding the privileged credential. The lock is
//! a blocking `std::sync::Mutex`: its guard cannot be held across an `.await`
//! in a spawned task, so no network round trip ever runs inside the critical
//! section.

use crate::backend::TokenAttributes;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Number of leading characters kept when a token is logged.
pub const FINGERPRINT_LEN: usize = 10;

/// Loggable prefix of a token: first characters followed by `...`.
pub fn fingerprint(token: &str) -> String {
    let prefix: String = token.chars().take(FINGERPRINT_LEN).collect();
    format!("{}...", prefix)
}

/// Non-empty bearer string. `Debug` and `Display` only show the fingerprint.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token value, rejecting empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(Error::Validation("token must not be empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Full token value, for the outgoing request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken").field(&self.fingerprint()).finish()
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// The privileged credential and what is known about it.
#[derive(Clone, Debug)]
pub struct Credential {
    pub token: BearerToken,

    /// Attributes from the most recent successful lookup
    pub attributes: Option<TokenAttributes>,

    /// Last successful renewal
    pub renewed_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: BearerToken) -> Self {
        Self {
            token,
            attributes: None,
            renewed_at: None,
        }
    }

    pub fn with_attributes(mut self, attributes: TokenAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Single-slot store for the active credential.
pub struct CredentialState {
    slot: Mutex<Credential>,
}

impl CredentialState {
    /// Seed the store. The slot is never empty afterwards.
    pub fn new(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(credential),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Credential> {
        // Writers only swap whole values, so a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy out the current credential.
    pub fn read(&self) -> Credential {
        self.lock().clone()
    }

    /// Copy out just the bearer token.
    pub fn token(&self) -> BearerToken {
        self.lock().token.clone()
    }

    /// Swap in a new credential, returning the previous one.
    pub fn replace(&self, credential: Credential) -> Credential {
        std::mem::replace(&mut *self.lock(), credential)
    }

    /// Record a successful renewal of `token`.
    ///
    /// Nothing is written if the slot no longer holds `token`; returns whether
    /// the record was applied.
    pub fn record_renewal(
        &self,
        token: &BearerToken,
        attributes: Option<TokenAttributes>,
        at: DateTime<Utc>,
    ) -> bool {
        let mut slot = self.lock();
        if slot.token != *token {
            return false;
        }

        let mut renewed = slot.clone();
        renewed.renewed_at = Some(at);
        if attributes.is_some() {
            renewed.attributes = attributes;
        }
        *slot = renewed;
        true
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("credential", &self.read())
            .finish()
    }
}
