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

//! Vault Token Broker - issues, verifies and keeps alive short-lived Vault tokens.
//!
//! All privileged calls go through a single renewal token that the broker
//! renews in the background before it expires.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;

// Secret backend and credential lifecycle
pub mod backend;
pub mod credentials;
pub mod renewal;

// Services
pub mod issuance;
pub mod verification;

// Server
pub mod server;

#[cfg(test)]
mod testing;

// Public API
pub use backend::{SecretBackend, TokenAttributes, VaultClient};
pub use cli::Cli;
pub use config::Config;
pub use credentials::{BearerToken, Credential, CredentialState};
pub use error::{Error, Result};
pub use issuance::{Permissions, TokenIssuer};
pub use renewal::{RenewalLoop, RenewalSchedule};
pub use server::Server;
pub use verification::{TokenVerifier, Verification};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
