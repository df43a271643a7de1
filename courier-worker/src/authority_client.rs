// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The worker's mTLS client to the authority's internal realm (§4.7 steps
//! 3 and 2/5): delivery confirmation and status updates. Ground:
//! `agentgateway`'s `caclient.rs` for the `reqwest::Identity::from_pem` +
//! rustls-backed client shape (same as `courier-ingress`'s client, built
//! independently per §4.7 ADDED: "each worker owns its own `reqwest::Client`").

use chrono::Utc;
use serde::{Deserialize, Serialize};
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

impl AuthorityClientError {
    /// Step 6 of §4.7 classifies the failure: a 404 means the message was
    /// never registered (a recovery hole, never requeue); any other 4xx is
    /// permanent (mark failed, never requeue); 5xx and transport failures
    /// are retriable (requeue after the retry interval).
    pub fn is_retriable(&self) -> bool {
        match self {
            AuthorityClientError::Transport(_) => true,
            AuthorityClientError::Identity(_) => false,
            AuthorityClientError::Rejected { status, .. } => (500..600).contains(status),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthorityClientError::Rejected { status: 404, .. })
    }
}

#[derive(Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    base_url: String,
    deliver_path: String,
    status_path: String,
}

#[derive(Serialize)]
struct DeliverRequest<'a> {
    message_id: Uuid,
    worker_id: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeliverResponse {
    pub message_id: Uuid,
    pub status: String,
    pub delivered_at: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
struct UpdateStatusRequest<'a> {
    status: &'a str,
    attempt_count: i32,
    error: Option<&'a str>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateStatusResponse {
    pub message_id: Uuid,
    pub status: String,
    pub attempt_count: i32,
}

impl AuthorityClient {
    pub fn new(settings: &AuthorityClientSettings, request_timeout: std::time::Duration) -> Result<Self, AuthorityClientError> {
        let mut identity_pem = std::fs::read(&settings.client_cert_path).map_err(AuthorityClientError::Identity)?;
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
            deliver_path: settings.deliver_path.clone(),
            status_path: settings.status_path.clone(),
        })
    }

    /// `MarkDelivered` (§4.7 step 3).
    pub async fn mark_delivered(&self, message_id: Uuid, worker_id: &str) -> Result<DeliverResponse, AuthorityClientError> {
        let url = format!("{}{}", self.base_url, self.deliver_path);
        let response = self
            .http
            .post(&url)
            .json(&DeliverRequest { message_id, worker_id })
            .send()
            .await?;
        reject_if_error_json(response).await
    }

    /// `UpdateStatus` (§4.7 steps 2 and 5).
    pub async fn update_status(
        &self,
        message_id: Uuid,
        status: &str,
        attempt_count: i32,
        error: Option<&str>,
    ) -> Result<UpdateStatusResponse, AuthorityClientError> {
        let url = format!("{}{}/{}/status", self.base_url, self.status_path, message_id);
        let response = self
            .http
            .put(&url)
            .json(&UpdateStatusRequest {
                status,
                attempt_count,
                error,
            })
            .send()
            .await?;
        reject_if_error_json(response).await
    }
}

/// Narrows [`AuthorityClient`] to the two calls `process_entry` makes, so
/// its branches can run against a mock instead of a live mTLS connection
/// (ground: `connect.rs`'s `ConnectHandleProtocol` — a single-purpose trait
/// over a wider client, automocked and consumed generically).
#[cfg_attr(test, mockall::automock)]
pub trait AuthorityGateway: Send + Sync {
    async fn mark_delivered(&self, message_id: Uuid, worker_id: &str) -> Result<DeliverResponse, AuthorityClientError>;

    async fn update_status(
        &self,
        message_id: Uuid,
        status: &str,
        attempt_count: i32,
        error: Option<&str>,
    ) -> Result<UpdateStatusResponse, AuthorityClientError>;
}

impl AuthorityGateway for AuthorityClient {
    async fn mark_delivered(&self, message_id: Uuid, worker_id: &str) -> Result<DeliverResponse, AuthorityClientError> {
        AuthorityClient::mark_delivered(self, message_id, worker_id).await
    }

    async fn update_status(
        &self,
        message_id: Uuid,
        status: &str,
        attempt_count: i32,
        error: Option<&str>,
    ) -> Result<UpdateStatusResponse, AuthorityClientError> {
        AuthorityClient::update_status(self, message_id, status, attempt_count, error).await
    }
}

async fn reject_if_error_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AuthorityClientError> {
    if response.status().is_success() {
        Ok(response.json().await?)
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
    fn server_errors_are_retriable_client_errors_are_not() {
        assert!(AuthorityClientError::Rejected { status: 503, body: String::new() }.is_retriable());
        assert!(!AuthorityClientError::Rejected { status: 400, body: String::new() }.is_retriable());
    }

    #[test]
    fn not_found_is_detected_but_not_retriable() {
        let err = AuthorityClientError::Rejected { status: 404, body: String::new() };
        assert!(err.is_not_found());
        assert!(!err.is_retriable());
    }
}
