// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The ingress's mTLS client to the authority's internal realm (§4.6 steps
//! 2 and 6): fingerprint lookup (cached for a short TTL so the happy path
//! doesn't pay a round trip per request) and message registration. Ground:
//! `agentgateway`'s `caclient.rs` for the `reqwest::Identity::from_pem` +
//! rustls-backed client shape.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use chrono::Utc;
use courier_common::{error::ErrorKind, identifiers::ClientId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::settings::AuthorityClientSettings;

#[derive(Debug, Error)]
pub enum AuthorityClientError {
    #[error("transport error calling authority: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to load authority mTLS material: {0}")]
    Identity(std::io::Error),

    #[error("authority rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<AuthorityClientError> for ErrorKind {
    fn from(err: AuthorityClientError) -> Self {
        match err {
            AuthorityClientError::Transport(_) => ErrorKind::TransientDependency(err.to_string()),
            AuthorityClientError::Identity(_) => ErrorKind::Internal(err.to_string()),
            AuthorityClientError::Rejected { status, body } => match status {
                400 => ErrorKind::validation("payload", body),
                401 => ErrorKind::Authentication(body),
                403 => ErrorKind::Authorization(body),
                404 => ErrorKind::NotFound(body),
                409 => ErrorKind::Conflict(body),
                429 => ErrorKind::RateLimitExceeded { retry_after_secs: 1 },
                500..=599 => ErrorKind::TransientDependency(body),
                _ => ErrorKind::PermanentDependency(body),
            },
        }
    }
}

#[derive(Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    base_url: String,
    register_path: String,
    lookup_path: String,
    fingerprint_cache: FingerprintCache,
}

struct FingerprintCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, ClientId)>>,
}

impl Clone for FingerprintCache {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            entries: RwLock::new(self.entries.read().expect("lock not poisoned").clone()),
        }
    }
}

impl FingerprintCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, fingerprint: &str) -> Option<ClientId> {
        let entries = self.entries.read().expect("lock not poisoned");
        entries.get(fingerprint).and_then(|(fetched_at, client_id)| {
            if fetched_at.elapsed() < self.ttl {
                Some(client_id.clone())
            } else {
                None
            }
        })
    }

    fn put(&self, fingerprint: String, client_id: ClientId) {
        self.entries
            .write()
            .expect("lock not poisoned")
            .insert(fingerprint, (Instant::now(), client_id));
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    sender_id: &'a str,
    body: &'a str,
    client_id: &'a str,
    domain: Option<&'a str>,
    message_id: Uuid,
    dedup_key: Option<&'a str>,
    metadata: Option<&'a Value>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    message_id: Uuid,
    status: String,
    created_at: chrono::DateTime<Utc>,
    sender_hash: String,
    body_sealed_hex: String,
}

/// What the authority stored for a just-registered message, handed back so
/// the ingress can build a queue entry whose contents match (§4.6 step 7).
#[derive(Clone, Debug)]
pub struct RegisteredMessage {
    pub message_id: Uuid,
    pub status: String,
    pub created_at: chrono::DateTime<Utc>,
    pub sender_hash: String,
    pub body_sealed: Vec<u8>,
}

#[derive(Deserialize)]
struct LookupResponse {
    client_id: String,
}

/// Narrows [`AuthorityClient`] to the two calls `submit_message` and the
/// [`crate::extract::IngressClient`] extractor need, so handler-level tests
/// can swap in a mock instead of a live authority (ground: `connect.rs`'s
/// `ConnectHandleProtocol` — a single-purpose trait over a wider service,
/// automocked and consumed generically rather than as `dyn`).
#[cfg_attr(test, mockall::automock)]
pub trait AuthorityGateway: Send + Sync {
    async fn lookup_client(&self, fingerprint: &str) -> Result<ClientId, AuthorityClientError>;

    #[allow(clippy::too_many_arguments)]
    async fn register_message(
        &self,
        message_id: Uuid,
        client_id: &ClientId,
        sender_number: &str,
        message_body: &str,
        domain: Option<&str>,
        dedup_key: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<RegisteredMessage, AuthorityClientError>;
}

impl AuthorityGateway for AuthorityClient {
    async fn lookup_client(&self, fingerprint: &str) -> Result<ClientId, AuthorityClientError> {
        AuthorityClient::lookup_client(self, fingerprint).await
    }

    async fn register_message(
        &self,
        message_id: Uuid,
        client_id: &ClientId,
        sender_number: &str,
        message_body: &str,
        domain: Option<&str>,
        dedup_key: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<RegisteredMessage, AuthorityClientError> {
        AuthorityClient::register_message(
            self, message_id, client_id, sender_number, message_body, domain, dedup_key, metadata,
        )
        .await
    }
}

impl AuthorityClient {
    pub fn new(settings: &AuthorityClientSettings, request_timeout: Duration, fingerprint_cache_ttl: Duration) -> Result<Self, AuthorityClientError> {
        let cert_pem = std::fs::read(&settings.client_cert_path).map_err(AuthorityClientError::Identity)?;
        let mut identity_pem = cert_pem;
        let key_pem = std::fs::read(&settings.client_key_path).map_err(AuthorityClientError::Identity)?;
        identity_pem.extend_from_slice(&key_pem);
        let identity = reqwest::Identity::from_pem(&identity_pem)?;

        let ca_pem = std::fs::read(&settings.ca_cert_path).map_err(AuthorityClientError::Identity)?;
        let ca_cert = reqwest::Certificate::from_pem(&ca_pem)?;

        let http = reqwest::Client::builder()
            .identity(identity)
            .add_root_certificate(ca_cert)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            register_path: settings.register_path.clone(),
            lookup_path: settings.lookup_path.clone(),
            fingerprint_cache: FingerprintCache::new(fingerprint_cache_ttl),
        })
    }

    /// Resolves a leaf-certificate fingerprint to a `client_id` (§4.6 step
    /// 2), short-circuiting on a cache hit.
    pub async fn lookup_client(&self, fingerprint: &str) -> Result<ClientId, AuthorityClientError> {
        if let Some(client_id) = self.fingerprint_cache.get(fingerprint) {
            return Ok(client_id);
        }

        let url = format!("{}{}", self.base_url, self.lookup_path);
        let response = self
            .http
            .get(&url)
            .query(&[("fingerprint", fingerprint)])
            .send()
            .await?;

        let response = reject_if_error(response).await?;
        let body: LookupResponse = response.json().await?;
        let client_id = ClientId::new(body.client_id);
        self.fingerprint_cache.put(fingerprint.to_string(), client_id.clone());
        Ok(client_id)
    }

    /// Registers a message with the authority (§4.6 step 6), supplying
    /// `message_id` for idempotency and `dedup_key` for replay defense (§9
    /// Open Question 2).
    #[allow(clippy::too_many_arguments)]
    pub async fn register_message(
        &self,
        message_id: Uuid,
        client_id: &ClientId,
        sender_number: &str,
        message_body: &str,
        domain: Option<&str>,
        dedup_key: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<RegisteredMessage, AuthorityClientError> {
        let url = format!("{}{}", self.base_url, self.register_path);
        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest {
                sender_id: sender_number,
                body: message_body,
                client_id: client_id.as_str(),
                domain,
                message_id,
                dedup_key,
                metadata,
            })
            .send()
            .await?;

        let response = reject_if_error(response).await?;
        let body: RegisterResponse = response.json().await?;
        let body_sealed = hex::decode(&body.body_sealed_hex).map_err(|_| AuthorityClientError::Rejected {
            status: 502,
            body: "authority returned malformed sealed body".to_string(),
        })?;

        Ok(RegisteredMessage {
            message_id: body.message_id,
            status: body.status,
            created_at: body.created_at,
            sender_hash: body.sender_hash,
            body_sealed,
        })
    }
}

async fn reject_if_error(response: reqwest::Response) -> Result<reqwest::Response, AuthorityClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(AuthorityClientError::Rejected { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_cache_hits_within_ttl_and_expires_after() {
        let cache = FingerprintCache::new(Duration::from_millis(50));
        let client_id = ClientId::new("client_A");
        assert!(cache.get("abc").is_none());

        cache.put("abc".to_string(), client_id.clone());
        assert_eq!(cache.get("abc"), Some(client_id));

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("abc").is_none());
    }

    #[test]
    fn rejected_status_maps_to_matching_error_kind() {
        assert!(matches!(
            ErrorKind::from(AuthorityClientError::Rejected { status: 404, body: "x".into() }),
            ErrorKind::NotFound(_)
        ));
        assert!(matches!(
            ErrorKind::from(AuthorityClientError::Rejected { status: 409, body: "x".into() }),
            ErrorKind::Conflict(_)
        ));
        assert!(matches!(
            ErrorKind::from(AuthorityClientError::Rejected { status: 503, body: "x".into() }),
            ErrorKind::TransientDependency(_)
        ));
    }
}
