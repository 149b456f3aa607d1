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

//! Server orchestration.
//!
//! Startup order: probe the backend (warning only), verify the renewal token
//! (fatal), start the renewal loop, then accept traffic.

use crate::backend::{SecretBackend, VaultClient};
use crate::config::Config;
use crate::credentials::{BearerToken, Credential, CredentialState};
use crate::error::{Error, Result};
use crate::handlers::{self, AppState};
use crate::renewal::RenewalLoop;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/token/create", post(handlers::create_token))
        .route("/api/data", get(handlers::get_data))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Log whether the backend answers at all. Never fails.
pub async fn check_backend(vault: &VaultClient) {
    match vault.probe_health().await {
        Ok(status) => info!(vault_addr = %vault.base_url(), status, "Vault reachable"),
        Err(e) => {
            error!(vault_addr = %vault.base_url(), error = %e, "Vault unreachable");
            warn!("Starting anyway; Vault is required to serve requests");
        }
    }
}

/// Confirm the renewal token is currently valid.
pub async fn verify_renewal_token(
    backend: &dyn SecretBackend,
    token: BearerToken,
) -> Result<Credential> {
    let attrs = backend.lookup_self(&token).await.map_err(|e| {
        error!(token = %token, error = %e, "Renewal token is not valid");
        Error::InvalidRenewalCredential(e.to_string())
    })?;

    info!(
        display_name = attrs.display_name.as_deref().unwrap_or("N/A"),
        ttl = attrs.ttl,
        creation_ttl = attrs.creation_ttl,
        created_at = ?attrs.created_at(),
        "Renewal token verified"
    );

    Ok(Credential::new(token).with_attributes(attrs))
}

/// Token broker server
pub struct Server {
    config: Config,
    backend: Arc<VaultClient>,
    credentials: Arc<CredentialState>,
}

impl Server {
    /// Create the server, running the startup checks.
    pub async fn new(config: Config) -> Result<Self> {
        let backend = Arc::new(VaultClient::new(
            config.vault_addr.clone(),
            config.request_timeout,
        )?);

        check_backend(&backend).await;
        let credential =
            verify_renewal_token(backend.as_ref(), config.renewal_token.clone()).await?;

        Ok(Self {
            config,
            backend,
            credentials: Arc::new(CredentialState::new(credential)),
        })
    }

    /// Run the server until a shutdown signal or a renewal loop failure.
    pub async fn run(self) -> Result<()> {
        let http_addr = self.config.http_addr;
        let backend: Arc<dyn SecretBackend> = self.backend.clone();

        // ====================================================================
        // Renewal loop
        // ====================================================================
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let renewal = Arc::new(RenewalLoop::new(
            backend.clone(),
            self.credentials.clone(),
            self.config.schedule,
        ));
        let mut renewal_task = renewal.spawn(shutdown_rx);
        info!("Token renewal loop spawned");

        // ====================================================================
        // HTTP
        // ====================================================================
        let state = AppState::new(
            backend,
            self.credentials.clone(),
            &self.config.vault_addr,
            &self.config.token_ttl,
        );
        let http_router = router(state);

        info!("[TOKEN-BROKER]: Starting server");
        info!("");
        info!("  HTTP: http://{}", http_addr);
        info!("    POST /api/token/create");
        info!("    GET  /api/data");
        info!("    GET  /health");
        info!("");
        info!("  Vault: {}", self.config.vault_addr);
        info!("");

        let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        let result = supervise(
            http_server.into_future(),
            &mut renewal_task,
            shutdown_signal(),
        )
        .await;

        let _ = shutdown_tx.send(true);
        renewal_task.abort();

        info!("Server shutdown complete");
        result
    }
}

/// Wait for the first of: HTTP server exit, renewal loop exit, shutdown.
///
/// The renewal loop only returns on shutdown, so any exit of it while the
/// server is still running is an error.
async fn supervise<F, S>(
    http_server: F,
    renewal_task: &mut JoinHandle<()>,
    shutdown: S,
) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        res = http_server => res.map_err(Error::from),
        res = renewal_task => {
            error!(result = ?res, "Token renewal loop terminated");
            Err(Error::Internal("token renewal loop terminated".to_string()))
        }
        _ = shutdown => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("Shutting down gracefully...");
}
