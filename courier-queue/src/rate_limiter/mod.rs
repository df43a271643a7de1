// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rate limiter (C8, §4.8): a token-bucket-style allowance per client,
//! refilled on a fixed window. Shared across ingress instances through a
//! [`StorageProvider`] backed by `courier-queue`'s own Postgres pool.

pub mod provider;

use chrono::TimeDelta;
use sha2::{Digest, Sha256};
use sqlx::types::chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RLConfig {
    pub max_requests: u64,
    pub time_window: TimeDelta,
}

impl Default for RLConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            time_window: TimeDelta::seconds(60),
        }
    }
}

/// Domain-separated SHA-256 key identifying a rate-limit bucket, e.g. one
/// per `(ingress, submit_message, client_id)` triple.
#[derive(Debug, Clone)]
pub struct RLKey {
    key: [u8; 32],
}

impl RLKey {
    pub fn new(service_name: &[u8], rpc_name: &[u8], custom: &[&[u8]]) -> Self {
        let key = {
            let mut hasher = Sha256::new();
            for part in [service_name, rpc_name].into_iter().chain(custom.iter().copied()) {
                hasher.update((part.len() as u32).to_be_bytes());
                hasher.update(part);
            }
            hasher.finalize().into()
        };
        RLKey { key }
    }

    pub fn for_client(client_id: &str) -> Self {
        Self::new(b"ingress", b"submit_message", &[client_id.as_bytes()])
    }

    pub fn serialize(&self) -> &[u8] {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allowance {
    remaining: u64,
    valid_until: DateTime<Utc>,
}

impl Allowance {
    pub fn new(config: &RLConfig) -> Self {
        Allowance {
            remaining: config.max_requests,
            valid_until: Utc::now() + config.time_window,
        }
    }

    fn reset(&mut self, config: &RLConfig) {
        self.remaining = config.max_requests;
        self.valid_until = Utc::now() + config.time_window;
    }

    fn allowed(&mut self, config: &RLConfig) -> bool {
        if self.valid_until < Utc::now() {
            self.reset(config);
        }
        if self.remaining == 0 {
            false
        } else {
            self.remaining -= 1;
            true
        }
    }

    /// Seconds until the window resets, for the `retry_after` hint (§6.1).
    pub fn retry_after_secs(&self) -> u64 {
        (self.valid_until - Utc::now()).num_seconds().max(0) as u64
    }
}

pub trait StorageProvider {
    async fn get(&self, key: &RLKey) -> Option<Allowance>;
    async fn set(&self, key: RLKey, allowance: Allowance);
}

pub struct RateLimiter<S: StorageProvider> {
    config: RLConfig,
    storage: S,
}

/// Outcome of a rate-limit check, carrying the `retry_after` hint a rejected
/// request must surface (§6.1).
pub enum Decision {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

impl<S: StorageProvider> RateLimiter<S> {
    pub fn new(config: RLConfig, storage: S) -> Self {
        RateLimiter { config, storage }
    }

    pub async fn check(&self, key: RLKey) -> Decision {
        let mut allowance = self
            .storage
            .get(&key)
            .await
            .unwrap_or_else(|| Allowance::new(&self.config));

        if allowance.allowed(&self.config) {
            self.storage.set(key, allowance).await;
            Decision::Allowed
        } else {
            Decision::Rejected {
                retry_after_secs: allowance.retry_after_secs(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::{provider::InMemoryStorage, *};

    #[tokio::test]
    async fn allows_up_to_max_then_rejects() {
        let config = RLConfig {
            max_requests: 5,
            time_window: TimeDelta::milliseconds(1),
        };
        let storage = InMemoryStorage::new();
        let rate_limiter = RateLimiter::new(config.clone(), storage);

        let key = RLKey::new(b"test_service", b"test_rpc", &[]);

        for _ in 0..config.max_requests {
            assert!(matches!(
                rate_limiter.check(key.clone()).await,
                Decision::Allowed
            ));
        }

        assert!(matches!(
            rate_limiter.check(key.clone()).await,
            Decision::Rejected { .. }
        ));

        tokio::time::sleep(config.time_window.to_std().unwrap()).await;

        assert!(matches!(
            rate_limiter.check(key).await,
            Decision::Allowed
        ));
    }

    #[tokio::test]
    async fn hundredth_request_allowed_hundred_and_first_rejected() {
        let config = RLConfig::default();
        let storage = InMemoryStorage::new();
        let rate_limiter = RateLimiter::new(config.clone(), storage);
        let key = RLKey::for_client("client_A");

        for _ in 0..100 {
            assert!(matches!(
                rate_limiter.check(key.clone()).await,
                Decision::Allowed
            ));
        }
        assert!(matches!(
            rate_limiter.check(key).await,
            Decision::Rejected { .. }
        ));
    }

}
