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

//! Configuration management.

use crate::cli::Cli;
use crate::credentials::BearerToken;
use crate::error::{Error, Result};
use crate::renewal::RenewalSchedule;
use reqwest::Url;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,

    // Secret backend
    pub vault_addr: String,
    pub renewal_token: BearerToken,
    pub request_timeout: Duration,

    // Renewal
    pub schedule: RenewalSchedule,

    // Issuance
    pub token_ttl: String,

    // Server
    pub http_addr: SocketAddr,
}

impl TryFrom<Cli> for Config {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let vault_addr = normalize_vault_addr(&cli.vault_addr)?;

        let renewal_token = BearerToken::new(cli.renewal_token)
            .map_err(|_| Error::Config("RENEWAL_TOKEN must not be empty".to_string()))?;

        let http_addr: SocketAddr = format!("{}:{}", cli.bind_address, cli.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid HTTP address: {}", e)))?;

        if cli.request_timeout == 0 {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }
        if cli.check_interval == 0 || cli.retry_interval == 0 {
            return Err(Error::Config("renewal intervals must be positive".to_string()));
        }

        let token_ttl = cli.token_ttl.trim().to_string();
        if token_ttl.is_empty() {
            return Err(Error::Config("token ttl must not be empty".to_string()));
        }

        Ok(Self {
            debug: cli.debug,
            vault_addr,
            renewal_token,
            request_timeout: Duration::from_secs(cli.request_timeout),
            schedule: RenewalSchedule {
                check_interval: Duration::from_secs(cli.check_interval),
                retry_interval: Duration::from_secs(cli.retry_interval),
            },
            token_ttl,
            http_addr,
        })
    }
}

/// Validate the backend address and strip any trailing slash.
fn normalize_vault_addr(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| Error::Config(format!("Invalid VAULT_ADDR {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(Error::Config(format!(
            "Unsupported VAULT_ADDR scheme: {}",
            other
        ))),
    }
}
