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

//! CLI argument definitions.

use clap::Parser;

/// Vault Token Broker - issues, verifies and keeps alive Vault tokens
#[derive(Parser, Debug)]
#[command(name = "vault-token-broker")]
#[command(about = "Vault Token Broker\n\nIssues scoped Vault tokens and keeps the renewal token alive.")]
#[command(version)]
pub struct Cli {
    // === General ===
    /// Enable debug mode (human-readable logs)
    #[arg(long, env = "TOKEN_BROKER_DEBUG", default_value = "false")]
    pub debug: bool,

    /// Log level
    #[arg(long, env = "TOKEN_BROKER_LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    // === Secret backend ===
    /// Vault base address
    #[arg(long, env = "VAULT_ADDR", default_value = "http://127.0.0.1:8200")]
    pub vault_addr: String,

    /// Privileged token used for create/renew/lookup calls
    #[arg(long, env = "RENEWAL_TOKEN", hide_env_values = true)]
    pub renewal_token: String,

    /// Per-call backend timeout in seconds
    #[arg(long, env = "TOKEN_BROKER_REQUEST_TIMEOUT", default_value = "5")]
    pub request_timeout: u64,

    // === Renewal ===
    /// Seconds between renewal checks
    #[arg(long, env = "TOKEN_BROKER_CHECK_INTERVAL", default_value = "10")]
    pub check_interval: u64,

    /// Seconds to wait after the backend was unavailable
    #[arg(long, env = "TOKEN_BROKER_RETRY_INTERVAL", default_value = "5")]
    pub retry_interval: u64,

    // === Issuance ===
    /// Default ttl of issued tokens (Vault duration string)
    #[arg(long, env = "TOKEN_BROKER_TOKEN_TTL", default_value = "1h")]
    pub token_ttl: String,

    // === Server ===
    /// Bind address
    #[arg(long, env = "TOKEN_BROKER_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// HTTP port
    #[arg(long, env = "TOKEN_BROKER_HTTP_PORT", default_value = "5001")]
    pub http_port: u16,
}
