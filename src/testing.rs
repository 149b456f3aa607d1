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

//! Scripted in-memory backend for unit tests.

use crate::backend::{CreateTokenRequest, SecretBackend, TokenAttributes};
use crate::credentials::BearerToken;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FakeBackend {
    pub lookups: AtomicUsize,
    pub renewals: AtomicUsize,
    pub creates: AtomicUsize,

    /// Known tokens; anything else is rejected with 403
    tokens: Mutex<HashMap<String, TokenAttributes>>,
    renew_fails: AtomicBool,
    create_fails: AtomicBool,
    lookup_panics: AtomicUsize,

    renewed: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, CreateTokenRequest)>>,

    on_lookup: Mutex<Option<Hook>>,
    renew_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_token(self: Arc<Self>, token: &str, ttl: u64, creation_ttl: u64) -> Arc<Self> {
        self.set_token(token, ttl, creation_ttl);
        self
    }

    pub fn set_token(&self, token: &str, ttl: u64, creation_ttl: u64) {
        let attrs = TokenAttributes {
            ttl,
            creation_ttl,
            display_name: Some(format!("token-{}", token)),
            creation_time: Some(1_700_000_000),
            ..Default::default()
        };
        self.tokens.lock().unwrap().insert(token.to_string(), attrs);
    }

    pub fn fail_renewals(&self) {
        self.renew_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_creates(&self) {
        self.create_fails.store(true, Ordering::SeqCst);
    }

    /// Panic inside the next `count` lookups.
    pub fn panic_on_lookups(&self, count: usize) {
        self.lookup_panics.store(count, Ordering::SeqCst);
    }

    /// Run `hook` after every successful lookup.
    pub fn on_lookup(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_lookup.lock().unwrap() = Some(Box::new(hook));
    }

    /// Hold every renewal until `gate` is notified.
    pub fn gate_renewals(&self, gate: Arc<Notify>) {
        *self.renew_gate.lock().unwrap() = Some(gate);
    }

    pub fn renewed_tokens(&self) -> Vec<String> {
        self.renewed.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, CreateTokenRequest)> {
        self.created.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretBackend for FakeBackend {
    async fn lookup_self(&self, token: &BearerToken) -> Result<TokenAttributes> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let remaining = self.lookup_panics.load(Ordering::SeqCst);
        if remaining > 0 {
            self.lookup_panics.store(remaining - 1, Ordering::SeqCst);
            panic!("scripted lookup panic");
        }

        let attrs = self.tokens.lock().unwrap().get(token.expose()).cloned();
        match attrs {
            Some(attrs) => {
                if let Some(hook) = self.on_lookup.lock().unwrap().as_ref() {
                    hook();
                }
                Ok(attrs)
            }
            None => Err(Error::status("lookup-self", 403)),
        }
    }

    async fn renew_self(&self, token: &BearerToken) -> Result<()> {
        self.renewals.fetch_add(1, Ordering::SeqCst);

        let gate = self.renew_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.renew_fails.load(Ordering::SeqCst) {
            return Err(Error::status("renew-self", 500));
        }
        self.renewed.lock().unwrap().push(token.expose().to_string());
        Ok(())
    }

    async fn create_token(
        &self,
        auth_token: &BearerToken,
        request: &CreateTokenRequest,
    ) -> Result<BearerToken> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(Error::status("create-token", 500));
        }

        self.created
            .lock()
            .unwrap()
            .push((auth_token.expose().to_string(), request.clone()));
        BearerToken::new(format!("hvs.minted-{}", request.display_name))
    }
}
