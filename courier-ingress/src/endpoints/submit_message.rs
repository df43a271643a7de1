// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `POST /api/v1/messages` (§4.6): the ingress gate's single public
//! endpoint. Implemented as one `async fn` with early-return `?` at each of
//! the seven steps (ground: the `?`-heavy style throughout
//! `backend/src/qs/queue.rs`).

use axum::{extract::State, Json};
use chrono::Utc;
use courier_common::{error::ErrorKind, identifiers::{ClientId, MessageId}};
use courier_queue::{
    entry::QueueEntry,
    rate_limiter::{Decision, RLKey, StorageProvider},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    authority_client::AuthorityGateway, error::ApiError, extract::IngressClient, queue_sink::QueueSink,
    state::AppState, validation,
};

#[derive(Deserialize)]
pub struct SubmitMessageRequest {
    pub sender_number: String,
    pub message_body: String,
    /// Accepted and validated as an arbitrary JSON object when present;
    /// forwarded to the authority's register call, which stores it as a
    /// JSON blob alongside the message (§6.1).
    pub metadata: Option<Value>,
}

#[derive(Serialize)]
pub struct SubmitMessageResponse {
    pub message_id: Uuid,
    pub status: &'static str,
    pub client_id: String,
    pub queued_at: chrono::DateTime<Utc>,
}

pub async fn submit_message(
    State(state): State<AppState>,
    client: IngressClient,
    Json(req): Json<SubmitMessageRequest>,
) -> Result<Json<SubmitMessageResponse>, ApiError> {
    // Step 2: fingerprint -> client_id, rejecting revoked/expired/unknown certs
    // (resolved by the `IngressClient` extractor before this body runs).
    let response = submit_message_core(&state, client.client_id, req).await?;
    Ok(Json(response))
}

/// Steps 3-7 of §4.6, generic over the authority/queue/rate-limit-storage
/// dependencies so it can run against mocks (ground: the `impl Trait`
/// dispatch in `connect.rs`'s `run_protocol`). `submit_message` is the only
/// caller in production, always instantiated with the concrete types.
async fn submit_message_core<A, Q, S>(
    state: &AppState<A, Q, S>,
    client_id: ClientId,
    req: SubmitMessageRequest,
) -> Result<SubmitMessageResponse, ApiError>
where
    A: AuthorityGateway + Send + Sync + 'static,
    Q: QueueSink + Send + Sync + 'static,
    S: StorageProvider + Send + Sync + 'static,
{
    // Step 3: per-client rate limit.
    match state.rate_limiter.check(RLKey::for_client(client_id.as_str())).await {
        Decision::Allowed => {}
        Decision::Rejected { retry_after_secs } => {
            return Err(ErrorKind::RateLimitExceeded { retry_after_secs }.into());
        }
    }

    // Step 4: payload validation.
    if let Some(metadata) = &req.metadata {
        if !metadata.is_object() {
            return Err(ErrorKind::validation("metadata", "must be a JSON object").into());
        }
    }
    validation::validate_sender_number(&req.sender_number)?;
    validation::validate_message_body(&req.message_body)?;

    // Step 5: fresh message id.
    let message_id = Uuid::new_v4();

    // Replay defense (§9 Open Question 2): a minute-bucketed fingerprint of
    // client_id+sender+body, rejected as a 409 Conflict by the authority's
    // `dedup_key` unique index if the same client resubmits the same
    // sender/body within the same minute.
    let dedup_key = dedup_key(client_id.as_str(), &req.sender_number, &req.message_body);

    // Step 6: register with the authority (idempotent on message_id).
    let registered = state
        .authority
        .register_message(
            message_id,
            &client_id,
            &req.sender_number,
            &req.message_body,
            None,
            Some(&dedup_key),
            req.metadata.as_ref(),
        )
        .await?;

    // Step 7: enqueue a queue entry matching what the authority just stored.
    let entry = QueueEntry::new(
        MessageId::from(registered.message_id),
        client_id.clone(),
        registered.sender_hash,
        registered.body_sealed,
    );
    state.queue.enqueue(&entry).await?;

    Ok(SubmitMessageResponse {
        message_id: registered.message_id,
        status: "queued",
        client_id: client_id.as_str().to_string(),
        queued_at: registered.created_at,
    })
}

/// Minute-bucketed fingerprint of `client_id+sender+body` (§9 Open Question
/// 2, Design Notes). Two submissions with identical fields land in the same
/// bucket only if they arrive within the same wall-clock minute, so the
/// authority's unique `dedup_key` index rejects same-minute resubmission as
/// a replay without blocking a legitimate later repeat.
fn dedup_key(client_id: &str, sender_number: &str, message_body: &str) -> String {
    let minute_bucket = Utc::now().timestamp() / 60;
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(b"|");
    hasher.update(sender_number.as_bytes());
    hasher.update(b"|");
    hasher.update(message_body.as_bytes());
    hasher.update(b"|");
    hasher.update(minute_bucket.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_queue::rate_limiter::{provider::InMemoryStorage, RLConfig, RateLimiter};

    use crate::{
        authority_client::{AuthorityClientError, MockAuthorityGateway},
        queue_sink::MockQueueSink,
    };

    use super::*;

    fn sample_request() -> SubmitMessageRequest {
        SubmitMessageRequest {
            sender_number: "+12025551234".to_string(),
            message_body: "hello".to_string(),
            metadata: None,
        }
    }

    fn state_with(
        authority: MockAuthorityGateway,
        queue: MockQueueSink,
    ) -> AppState<MockAuthorityGateway, MockQueueSink, InMemoryStorage> {
        AppState {
            queue: Arc::new(queue),
            rate_limiter: Arc::new(RateLimiter::new(RLConfig::default(), InMemoryStorage::new())),
            authority: Arc::new(authority),
            started_at: std::time::Instant::now(),
        }
    }

    fn registered(sender_hash: &str) -> crate::authority_client::RegisteredMessage {
        crate::authority_client::RegisteredMessage {
            message_id: Uuid::new_v4(),
            status: "queued".to_string(),
            created_at: Utc::now(),
            sender_hash: sender_hash.to_string(),
            body_sealed: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn s1_happy_path_registers_then_enqueues() {
        let mut authority = MockAuthorityGateway::new();
        authority
            .expect_register_message()
            .times(1)
            .returning(|_, _, _, _, _, _, _| Ok(registered("sender-hash")));
        let mut queue = MockQueueSink::new();
        queue.expect_enqueue().times(1).returning(|_| Ok(()));

        let state = state_with(authority, queue);
        let response = submit_message_core(&state, ClientId::new("client_A"), sample_request())
            .await
            .expect("happy path succeeds");

        assert_eq!(response.status, "queued");
        assert_eq!(response.client_id, "client_A");
    }

    #[tokio::test]
    async fn s2_invalid_payload_never_reaches_authority_or_queue() {
        let mut authority = MockAuthorityGateway::new();
        authority.expect_register_message().times(0);
        let mut queue = MockQueueSink::new();
        queue.expect_enqueue().times(0);

        let state = state_with(authority, queue);
        let mut request = sample_request();
        request.message_body = String::new();

        let result = submit_message_core(&state, ClientId::new("client_A"), request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn s7_register_carries_the_same_dedup_key_on_every_call() {
        let captured = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut authority = MockAuthorityGateway::new();
        let sink = captured.clone();
        authority.expect_register_message().times(2).returning(move |_, _, _, _, _, dedup_key, _| {
            sink.lock().unwrap().push(dedup_key.map(str::to_string));
            Ok(registered("sender-hash"))
        });
        let mut queue = MockQueueSink::new();
        queue.expect_enqueue().times(2).returning(|_| Ok(()));

        let state = state_with(authority, queue);
        submit_message_core(&state, ClientId::new("client_A"), sample_request())
            .await
            .unwrap();
        submit_message_core(&state, ClientId::new("client_A"), sample_request())
            .await
            .unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_some());
        assert_eq!(calls[0], calls[1], "same client/sender/body within a minute dedupes identically");
    }

    #[tokio::test]
    async fn metadata_is_forwarded_to_the_register_call_unchanged() {
        let captured = Arc::new(std::sync::Mutex::new(None));
        let mut authority = MockAuthorityGateway::new();
        let sink = captured.clone();
        authority.expect_register_message().times(1).returning(move |_, _, _, _, _, _, metadata| {
            *sink.lock().unwrap() = metadata.cloned();
            Ok(registered("sender-hash"))
        });
        let mut queue = MockQueueSink::new();
        queue.expect_enqueue().times(1).returning(|_| Ok(()));

        let state = state_with(authority, queue);
        let mut request = sample_request();
        request.metadata = Some(serde_json::json!({"campaign": "q3"}));

        submit_message_core(&state, ClientId::new("client_A"), request).await.unwrap();

        assert_eq!(captured.lock().unwrap().as_ref(), Some(&serde_json::json!({"campaign": "q3"})));
    }

    #[tokio::test]
    async fn authority_conflict_surfaces_as_an_error() {
        let mut authority = MockAuthorityGateway::new();
        authority.expect_register_message().times(1).returning(|_, _, _, _, _, _, _| {
            Err(AuthorityClientError::Rejected { status: 409, body: "duplicate".to_string() })
        });
        let mut queue = MockQueueSink::new();
        queue.expect_enqueue().times(0);

        let state = state_with(authority, queue);
        let result = submit_message_core(&state, ClientId::new("client_A"), sample_request()).await;
        assert!(result.is_err());
    }

    #[test]
    fn dedup_key_is_deterministic_within_the_same_minute() {
        let a = dedup_key("client_A", "+12025551234", "hello");
        let b = dedup_key("client_A", "+12025551234", "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_key_differs_by_sender_or_body() {
        let base = dedup_key("client_A", "+12025551234", "hello");
        assert_ne!(base, dedup_key("client_A", "+19995551234", "hello"));
        assert_ne!(base, dedup_key("client_A", "+12025551234", "goodbye"));
        assert_ne!(base, dedup_key("client_B", "+12025551234", "hello"));
    }
}
