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

//! Background renewal of the privileged credential.
//!
//! The loop polls `lookup-self` for the renewal token and calls `renew-self`
//! once two thirds of its lifetime have elapsed (`ttl <= creation_ttl / 3`).
//!
//! Each iteration runs in its own task, so a panic inside one iteration is
//! reported as a `JoinError` and retried like an unreachable backend. The
//! loop only ends when the shutdown channel fires.

use crate::backend::SecretBackend;
use crate::credentials::CredentialState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sleep intervals of the renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalSchedule {
    /// Wait after a completed check (also used for non-renewable tokens)
    pub check_interval: Duration,
    /// Wait after the backend was unavailable
    pub retry_interval: Duration,
}

impl Default for RenewalSchedule {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Whether a token with this ttl should be renewed now.
///
/// Zero in either field means the backend reports a non-renewable token.
pub fn should_renew(ttl: u64, creation_ttl: u64) -> bool {
    if ttl == 0 || creation_ttl == 0 {
        return false;
    }
    ttl <= creation_ttl / 3
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Lookup failed, or the iteration faulted
    Unavailable,
    /// Backend reported a zero ttl or creation ttl
    NonRenewable,
    /// Not yet due for renewal
    Healthy,
    /// Renewal acknowledged by the backend
    Renewed,
    /// Renewal was due but the backend refused or failed
    RenewalFailed,
}

impl TickOutcome {
    /// How long to sleep before the next iteration.
    pub fn wait(self, schedule: &RenewalSchedule) -> Duration {
        match self {
            TickOutcome::Unavailable => schedule.retry_interval,
            _ => schedule.check_interval,
        }
    }
}

/// Keeps the renewal credential alive.
pub struct RenewalLoop {
    backend: Arc<dyn SecretBackend>,
    state: Arc<CredentialState>,
    schedule: RenewalSchedule,
}

impl RenewalLoop {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        state: Arc<CredentialState>,
        schedule: RenewalSchedule,
    ) -> Self {
        Self {
            backend,
            state,
            schedule,
        }
    }

    pub fn schedule(&self) -> RenewalSchedule {
        self.schedule
    }

    /// One watch/renew iteration.
    pub async fn tick(&self) -> TickOutcome {
        let token = self.state.token();

        let attrs = match self.backend.lookup_self(&token).await {
            Ok(attrs) => attrs,
            Err(e) => {
                error!(
                    token = %token,
                    error = %e,
                    retry_in = ?self.schedule.retry_interval,
                    "Cannot look up renewal token"
                );
                return TickOutcome::Unavailable;
            }
        };

        if attrs.ttl == 0 || attrs.creation_ttl == 0 {
            warn!(
                token = %token,
                ttl = attrs.ttl,
                creation_ttl = attrs.creation_ttl,
                "Renewal token reports no ttl; it may not be renewable"
            );
            return TickOutcome::NonRenewable;
        }

        info!(
            ttl = attrs.ttl,
            creation_ttl = attrs.creation_ttl,
            "Renewal token status"
        );

        if !should_renew(attrs.ttl, attrs.creation_ttl) {
            return TickOutcome::Healthy;
        }

        warn!(ttl = attrs.ttl, "Renewal token needs renewal");

        // Re-read: the slot may have been replaced while the lookup was in flight.
        let current = self.state.token();
        match self.backend.renew_self(&current).await {
            Ok(()) => {
                let attrs = (current == token).then_some(attrs);
                self.state.record_renewal(&current, attrs, Utc::now());
                info!(token = %current, "Renewal token renewed");
                TickOutcome::Renewed
            }
            Err(e) => {
                error!(
                    token = %current,
                    status = e.backend_status(),
                    error = %e,
                    "Renewal token renewal failed"
                );
                TickOutcome::RenewalFailed
            }
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            check_interval = ?self.schedule.check_interval,
            retry_interval = ?self.schedule.retry_interval,
            "Token renewal loop started"
        );

        loop {
            let this = self.clone();
            let outcome = match tokio::spawn(async move { this.tick().await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Renewal iteration aborted");
                    TickOutcome::Unavailable
                }
            };

            let wait = outcome.wait(&self.schedule);
            debug!(?outcome, ?wait, "Renewal iteration complete");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Token renewal loop stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Spawn [`RenewalLoop::run`] on the current runtime.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{BearerToken, Credential};
    use crate::testing::FakeBackend;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    const RENEWAL: &str = "hvs.renewal";

    fn state(token: &str) -> Arc<CredentialState> {
        Arc::new(CredentialState::new(Credential::new(
            BearerToken::new(token).unwrap(),
        )))
    }

    fn renewal_loop(backend: Arc<FakeBackend>, state: Arc<CredentialState>) -> Arc<RenewalLoop> {
        Arc::new(RenewalLoop::new(backend, state, RenewalSchedule::default()))
    }

    #[test]
    fn test_should_renew_boundaries() {
        assert!(should_renew(40, 120));
        assert!(should_renew(30, 120));
        assert!(!should_renew(41, 120));
        assert!(!should_renew(120, 120));
        assert!(should_renew(1, 3));
        assert!(!should_renew(2, 5));
        assert!(!should_renew(0, 120));
        assert!(!should_renew(10, 0));
        assert!(!should_renew(0, 0));
        assert!(!should_renew(u64::MAX, u64::MAX));
        assert!(should_renew(u64::MAX / 3, u64::MAX));
        assert!(!should_renew(u64::MAX / 3 + 1, u64::MAX));
    }

    #[test]
    fn test_should_renew_matches_one_third_rule() {
        for creation_ttl in 1..=300u64 {
            for ttl in 1..=300u64 {
                let expected = (ttl as f64) <= (creation_ttl as f64) / 3.0;
                assert_eq!(
                    should_renew(ttl, creation_ttl),
                    expected,
                    "ttl={} creation_ttl={}",
                    ttl,
                    creation_ttl
                );
            }
        }
    }

    #[test]
    fn test_wait_per_outcome() {
        let schedule = RenewalSchedule::default();
        assert_eq!(TickOutcome::Unavailable.wait(&schedule), Duration::from_secs(5));
        assert_eq!(TickOutcome::NonRenewable.wait(&schedule), Duration::from_secs(10));
        assert_eq!(TickOutcome::Healthy.wait(&schedule), Duration::from_secs(10));
        assert_eq!(TickOutcome::Renewed.wait(&schedule), Duration::from_secs(10));
        assert_eq!(TickOutcome::RenewalFailed.wait(&schedule), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_tick_renews_at_boundary() {
        let backend = FakeBackend::new().with_token(RENEWAL, 40, 120);
        let state = state(RENEWAL);
        let renewal = renewal_loop(backend.clone(), state.clone());

        assert_eq!(renewal.tick().await, TickOutcome::Renewed);
        assert_eq!(FakeBackend::count(&backend.renewals), 1);
        assert_eq!(backend.renewed_tokens(), vec![RENEWAL.to_string()]);

        let credential = state.read();
        assert_eq!(credential.token.expose(), RENEWAL);
        assert!(credential.renewed_at.is_some());
        assert_eq!(credential.attributes.unwrap().ttl, 40);
    }

    #[tokio::test]
    async fn test_tick_healthy_above_boundary() {
        let backend = FakeBackend::new().with_token(RENEWAL, 41, 120);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));

        assert_eq!(renewal.tick().await, TickOutcome::Healthy);
        assert_eq!(FakeBackend::count(&backend.renewals), 0);
    }

    #[tokio::test]
    async fn test_tick_non_renewable() {
        let backend = FakeBackend::new().with_token(RENEWAL, 0, 0);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        assert_eq!(renewal.tick().await, TickOutcome::NonRenewable);

        backend.set_token(RENEWAL, 30, 0);
        assert_eq!(renewal.tick().await, TickOutcome::NonRenewable);

        assert_eq!(FakeBackend::count(&backend.renewals), 0);
    }

    #[tokio::test]
    async fn test_tick_unavailable_on_lookup_failure() {
        let backend = FakeBackend::new();
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));

        assert_eq!(renewal.tick().await, TickOutcome::Unavailable);
        assert_eq!(FakeBackend::count(&backend.renewals), 0);
    }

    #[tokio::test]
    async fn test_tick_renewal_failure_leaves_state() {
        let backend = FakeBackend::new().with_token(RENEWAL, 10, 120);
        backend.fail_renewals();
        let state = state(RENEWAL);
        let renewal = renewal_loop(backend.clone(), state.clone());

        assert_eq!(renewal.tick().await, TickOutcome::RenewalFailed);
        assert!(state.read().renewed_at.is_none());
    }

    #[tokio::test]
    async fn test_tick_renews_fresh_token() {
        let backend = FakeBackend::new().with_token(RENEWAL, 30, 120);
        let state = state(RENEWAL);
        {
            let state = state.clone();
            backend.on_lookup(move || {
                state.replace(Credential::new(BearerToken::new("hvs.rotated").unwrap()));
            });
        }
        let renewal = renewal_loop(backend.clone(), state.clone());

        assert_eq!(renewal.tick().await, TickOutcome::Renewed);
        assert_eq!(backend.renewed_tokens(), vec!["hvs.rotated".to_string()]);

        // Attributes of the old token are not attached to the new one.
        let credential = state.read();
        assert_eq!(credential.token.expose(), "hvs.rotated");
        assert!(credential.attributes.is_none());
        assert!(credential.renewed_at.is_some());
    }

    #[tokio::test]
    async fn test_reads_not_blocked_by_slow_renewal() {
        let backend = FakeBackend::new().with_token(RENEWAL, 10, 120);
        let gate = Arc::new(Notify::new());
        backend.gate_renewals(gate.clone());
        let state = state(RENEWAL);
        let renewal = renewal_loop(backend.clone(), state.clone());

        let pending = tokio::spawn({
            let renewal = renewal.clone();
            async move { renewal.tick().await }
        });

        while FakeBackend::count(&backend.renewals) == 0 {
            tokio::task::yield_now().await;
        }

        let readers: Vec<_> = (0..32)
            .map(|_| {
                let state = state.clone();
                tokio::task::spawn_blocking(move || state.read().token.expose().to_string())
            })
            .collect();

        for reader in readers {
            let token = tokio::time::timeout(Duration::from_secs(1), reader)
                .await
                .expect("reader blocked behind renewal")
                .unwrap();
            assert_eq!(token, RENEWAL);
        }
        assert!(!pending.is_finished());

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), TickOutcome::Renewed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_renews_once_per_poll() {
        let backend = FakeBackend::new().with_token(RENEWAL, 30, 120);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        let (_tx, rx) = watch::channel(false);
        let handle = renewal.spawn(rx);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(FakeBackend::count(&backend.renewals), 1);

        sleep(Duration::from_secs(8)).await;
        assert_eq!(FakeBackend::count(&backend.renewals), 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(FakeBackend::count(&backend.renewals), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_unavailable_every_retry_interval() {
        let backend = FakeBackend::new();
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        let (_tx, rx) = watch::channel(false);
        let handle = renewal.spawn(rx);

        sleep(Duration::from_secs(11)).await;
        // t=0, t=5, t=10
        assert_eq!(FakeBackend::count(&backend.lookups), 3);
        assert_eq!(FakeBackend::count(&backend.renewals), 0);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_non_renewable_slowly() {
        let backend = FakeBackend::new().with_token(RENEWAL, 0, 0);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        let (_tx, rx) = watch::channel(false);
        let handle = renewal.spawn(rx);

        sleep(Duration::from_secs(25)).await;
        // t=0, t=10, t=20
        assert_eq!(FakeBackend::count(&backend.lookups), 3);
        assert_eq!(FakeBackend::count(&backend.renewals), 0);
        assert!(!handle.is_finished());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_panicking_iteration() {
        let backend = FakeBackend::new().with_token(RENEWAL, 30, 120);
        backend.panic_on_lookups(1);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        let (_tx, rx) = watch::channel(false);
        let handle = renewal.spawn(rx);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(FakeBackend::count(&backend.lookups), 1);
        assert_eq!(FakeBackend::count(&backend.renewals), 0);
        assert!(!handle.is_finished());

        // Faulted iteration is retried after the retry interval.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(FakeBackend::count(&backend.lookups), 2);
        assert_eq!(FakeBackend::count(&backend.renewals), 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let backend = FakeBackend::new().with_token(RENEWAL, 100, 120);
        let renewal = renewal_loop(backend.clone(), state(RENEWAL));
        let (tx, rx) = watch::channel(false);
        let handle = renewal.spawn(rx);

        sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
