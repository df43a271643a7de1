// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Internal mTLS realm (§4.4, §6.2): message registration, delivery
//! confirmation, status updates, and certificate issuance/revocation/
//! inspection. Every handler's caller identity comes from [`MtlsClient`],
//! resolved from the verified leaf certificate before the body is read.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use courier_authority::ca::RevocationReason;
use courier_authority::store::audit::AuditEvent;
use courier_authority::store::messages::{MessageRecord, NewMessage};
use courier_authority::AuthorityError;
use courier_common::identifiers::{ClientId, MessageId, MessageStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiError,
    extract::MtlsClient,
    state::AppState,
};

use super::{require_audience, AUDIENCE_ADMIN, AUDIENCE_INGRESS, AUDIENCE_WORKER};

/// Narrows [`courier_authority::AuthorityStore`] to the message-lifecycle
/// writes `register_message`/`deliver_message` perform, so they can run
/// against a mocked store instead of a live Postgres connection (ground:
/// `connect.rs`'s `ConnectHandleProtocol` — a single-purpose trait over a
/// wider store, automocked and consumed generically rather than as `dyn`).
#[cfg_attr(test, mockall::automock)]
pub trait MessageDirectory: Send + Sync {
    async fn register_message(&self, new: NewMessage) -> Result<MessageRecord, AuthorityError>;
    async fn mark_delivered(&self, id: MessageId, delivered_at: chrono::DateTime<Utc>) -> Result<MessageRecord, AuthorityError>;
    async fn append_audit_event(&self, actor: String, action: String, subject_id: String, outcome: String) -> Result<(), AuthorityError>;
}

impl MessageDirectory for courier_authority::AuthorityStore {
    async fn register_message(&self, new: NewMessage) -> Result<MessageRecord, AuthorityError> {
        courier_authority::AuthorityStore::register_message(self, new).await
    }

    async fn mark_delivered(&self, id: MessageId, delivered_at: chrono::DateTime<Utc>) -> Result<MessageRecord, AuthorityError> {
        courier_authority::AuthorityStore::mark_delivered(self, id, delivered_at).await
    }

    async fn append_audit_event(&self, actor: String, action: String, subject_id: String, outcome: String) -> Result<(), AuthorityError> {
        courier_authority::AuthorityStore::append_audit_event(
            self,
            AuditEvent { actor: &actor, action: &action, subject_id: &subject_id, outcome: &outcome },
        )
        .await
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub sender_id: String,
    pub body: String,
    pub client_id: String,
    pub domain: Option<String>,
    pub message_id: Option<Uuid>,
    /// Internal-only replay-defense key (§9 Open Question 2); never part of
    /// the public ingress contract.
    pub dedup_key: Option<String>,
    /// Arbitrary JSON object accepted alongside the submission (§6.1
    /// `"metadata"?: object`), stored verbatim as a JSON blob.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message_id: Uuid,
    pub status: &'static str,
    pub created_at: chrono::DateTime<Utc>,
    /// Hex-packed `nonce || ciphertext`, mirroring
    /// [`courier_common::crypto::ear::Ciphertext::into_bytes`], and the
    /// salted sender hash — returned so the ingress can build a queue entry
    /// whose contents match what the authority just stored (§4.6 step 7)
    /// without holding the body key or sender salt itself.
    pub sender_hash: String,
    pub body_sealed_hex: String,
}

/// `POST /internal/messages/register` (§4.4, §6.2). Body is encrypted and
/// the sender hashed before storage; idempotent on `message_id`.
pub async fn register_message(
    State(state): State<AppState>,
    caller: MtlsClient,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_INGRESS).await?;
    let response = register_message_core(&state.store, &state.crypto, req).await?;
    Ok(Json(response))
}

/// §4.4/§4.6 step 6 registration, generic over [`MessageDirectory`] so it
/// can run against a mocked store (scenario S7: repeated `message_id`
/// returns the same row rather than erroring).
async fn register_message_core<D: MessageDirectory>(
    store: &D,
    crypto: &crate::state::CryptoContext,
    req: RegisterRequest,
) -> Result<RegisterResponse, ApiError> {
    let sender_hash = crypto.sender_salt.hash(&req.sender_id);
    let sealed = crypto
        .body_key
        .encrypt(req.body.as_bytes())
        .map_err(|_| courier_common::error::ErrorKind::Internal("body encryption failed".into()))?;
    let body_sealed_hex = hex::encode(sealed.clone().into_bytes());

    let id = req.message_id.map(MessageId::from).unwrap_or_else(MessageId::new_v4);
    let record = store
        .register_message(NewMessage {
            id,
            client_id: ClientId::new(req.client_id),
            sender_hash: sender_hash.clone(),
            body_ciphertext: sealed.ciphertext,
            body_nonce: sealed.nonce.to_vec(),
            domain_tag: req.domain,
            dedup_key: req.dedup_key,
            metadata: req.metadata,
        })
        .await?;

    Ok(RegisterResponse {
        message_id: record.id.as_uuid(),
        status: "queued",
        created_at: record.created_at,
        sender_hash,
        body_sealed_hex,
    })
}

#[derive(Deserialize)]
pub struct DeliverRequest {
    pub message_id: Uuid,
    pub worker_id: String,
}

#[derive(Serialize)]
pub struct DeliverResponse {
    pub message_id: Uuid,
    pub status: &'static str,
    pub delivered_at: chrono::DateTime<Utc>,
}

/// `POST /internal/messages/deliver` (§4.4, §4.7 step 3). Succeeds whether
/// this call performed the transition or the message was already
/// delivered by a racing worker (conditional-update idempotence).
pub async fn deliver_message(
    State(state): State<AppState>,
    caller: MtlsClient,
    Json(req): Json<DeliverRequest>,
) -> Result<Json<DeliverResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_WORKER).await?;
    let response = deliver_message_core(&state.store, req).await?;
    Ok(Json(response))
}

/// §4.7 step 3 delivery confirmation plus its audit side effect, generic
/// over [`MessageDirectory`].
async fn deliver_message_core<D: MessageDirectory>(store: &D, req: DeliverRequest) -> Result<DeliverResponse, ApiError> {
    let record = store.mark_delivered(MessageId::from(req.message_id), Utc::now()).await?;
    store
        .append_audit_event(req.worker_id, "deliver".to_string(), record.id.to_string(), "delivered".to_string())
        .await?;

    let delivered_at = record.delivered_at.unwrap_or_else(Utc::now);
    Ok(DeliverResponse {
        message_id: record.id.as_uuid(),
        status: "delivered",
        delivered_at,
    })
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub attempt_count: i32,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct UpdateStatusResponse {
    pub message_id: Uuid,
    pub status: String,
    pub attempt_count: i32,
    pub updated_at: chrono::DateTime<Utc>,
}

/// `PUT /internal/messages/{id}/status` (§4.4, §4.7 step 5/2). Advances the
/// attempt counter; `attempt_count` is only ever raised, never lowered
/// (§3 invariant), enforced with `GREATEST` at the store layer.
pub async fn update_status(
    State(state): State<AppState>,
    caller: MtlsClient,
    Path(message_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_WORKER).await?;

    let status = parse_status(&req.status)?;
    let record = state
        .store
        .update_status(MessageId::from(message_id), status, req.attempt_count, req.error)
        .await?;

    Ok(Json(UpdateStatusResponse {
        message_id: record.id.as_uuid(),
        status: req.status,
        attempt_count: record.attempt_count,
        updated_at: Utc::now(),
    }))
}

fn parse_status(raw: &str) -> Result<MessageStatus, ApiError> {
    match raw {
        "queued" => Ok(MessageStatus::Queued),
        "delivered" => Ok(MessageStatus::Delivered),
        "failed" => Ok(MessageStatus::Failed),
        other => Err(courier_common::error::ErrorKind::validation("status", format!("unrecognized status `{other}`")).into()),
    }
}

#[derive(Deserialize)]
pub struct LookupClientQuery {
    pub fingerprint: String,
}

#[derive(Serialize)]
pub struct LookupClientResponse {
    pub client_id: String,
}

/// `GET /internal/clients/lookup?fingerprint=...` (§4.6 step 2 ADDED):
/// resolves a normalized certificate fingerprint to a `client_id`, rejecting
/// unknown/revoked/expired certificates. Called by the ingress gate, which
/// holds no store of its own and caches the answer for a short TTL.
pub async fn lookup_client(
    State(state): State<AppState>,
    caller: MtlsClient,
    Query(query): Query<LookupClientQuery>,
) -> Result<Json<LookupClientResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_INGRESS).await?;

    let client_id = state
        .ca
        .validate_fingerprint(&state.store, &query.fingerprint)
        .await?;

    Ok(Json(LookupClientResponse {
        client_id: client_id.as_str().to_string(),
    }))
}

#[derive(Deserialize)]
pub struct GenerateCertificateRequest {
    pub client_id: String,
    pub domain: String,
    pub validity_days: Option<u32>,
}

#[derive(Serialize)]
pub struct GenerateCertificateResponse {
    pub client_id: String,
    pub certificate: String,
    pub private_key: String,
    pub ca_certificate: String,
    pub fingerprint: String,
    pub expires_at: chrono::DateTime<Utc>,
}

/// `POST /admin/certificates/generate` (§4.2, §6.2). The private key is
/// returned in this response only — it is never persisted by the authority.
pub async fn generate_certificate(
    State(state): State<AppState>,
    caller: MtlsClient,
    Json(req): Json<GenerateCertificateRequest>,
) -> Result<Json<GenerateCertificateResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_ADMIN).await?;

    let issued = state
        .ca
        .issue_client(&state.store, ClientId::new(req.client_id), req.domain)
        .await?;
    info!(client_id = %issued.client_id, "certificate generated by admin request");

    Ok(Json(GenerateCertificateResponse {
        client_id: issued.client_id.as_str().to_string(),
        certificate: issued.certificate_pem,
        private_key: issued.private_key_pem,
        ca_certificate: issued.ca_certificate_pem,
        fingerprint: issued.fingerprint,
        expires_at: issued.expires_at,
    }))
}

#[derive(Deserialize)]
pub struct RevokeCertificateRequest {
    pub client_id: String,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct RevokeCertificateResponse {
    pub client_id: String,
    pub status: &'static str,
    pub revoked_at: chrono::DateTime<Utc>,
}

/// `POST /admin/certificates/revoke` (§4.2, §6.2).
pub async fn revoke_certificate(
    State(state): State<AppState>,
    caller: MtlsClient,
    Json(req): Json<RevokeCertificateRequest>,
) -> Result<Json<RevokeCertificateResponse>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_ADMIN).await?;

    let reason = parse_revocation_reason(req.reason.as_deref());
    let client_id = ClientId::new(req.client_id);
    state
        .ca
        .revoke_client(&state.store, &client_id, reason, caller.client_id.as_str())
        .await?;

    Ok(Json(RevokeCertificateResponse {
        client_id: client_id.as_str().to_string(),
        status: "revoked",
        revoked_at: Utc::now(),
    }))
}

fn parse_revocation_reason(raw: Option<&str>) -> RevocationReason {
    match raw {
        Some("key_compromise") => RevocationReason::KeyCompromise,
        Some("cessation_of_operation") => RevocationReason::CessationOfOperation,
        Some("superseded") => RevocationReason::Superseded,
        _ => RevocationReason::AdminRevoked,
    }
}

#[derive(Deserialize)]
pub struct ListCertificatesQuery {
    pub domain: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct CertificateSummary {
    pub client_id: String,
    pub domain: String,
    pub status: String,
    pub issued_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
}

/// `GET /admin/certificates` (§6.2), with optional `domain`/`status` paging
/// filters.
pub async fn list_certificates(
    State(state): State<AppState>,
    caller: MtlsClient,
    Query(query): Query<ListCertificatesQuery>,
) -> Result<Json<Vec<CertificateSummary>>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_ADMIN).await?;

    let filter = courier_authority::store::clients::ClientFilter {
        domain: query.domain,
        status: query.status.as_deref().map(parse_client_status),
    };
    let paging = courier_authority::store::clients::ClientPaging {
        limit: query.limit.unwrap_or_default(),
        offset: query.offset.unwrap_or_default(),
    };
    let clients = state.ca.list_clients_paged(&state.store, filter, paging).await?;

    Ok(Json(
        clients
            .into_iter()
            .map(|c| CertificateSummary {
                client_id: c.client_id.as_str().to_string(),
                domain: c.domain,
                status: format!("{:?}", c.effective_status()).to_lowercase(),
                issued_at: c.issued_at,
                expires_at: c.expires_at,
            })
            .collect(),
    ))
}

fn parse_client_status(raw: &str) -> courier_common::identifiers::ClientStatus {
    use courier_common::identifiers::ClientStatus;
    match raw {
        "revoked" => ClientStatus::Revoked,
        "expired" => ClientStatus::Expired,
        _ => ClientStatus::Active,
    }
}

#[derive(Serialize)]
pub struct AdminStats {
    pub active_clients: usize,
    pub recent_audit_events: Vec<AuditEventSummary>,
}

#[derive(Serialize)]
pub struct AuditEventSummary {
    pub actor: String,
    pub action: String,
    pub subject_id: String,
    pub outcome: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// `GET /admin/stats` (§6.2): a lightweight operational snapshot, backed by
/// the audit log rather than any separate metrics store.
pub async fn admin_stats(
    State(state): State<AppState>,
    caller: MtlsClient,
) -> Result<Json<AdminStats>, ApiError> {
    require_audience(&state, &caller.client_id, AUDIENCE_ADMIN).await?;

    let active = state
        .ca
        .list_clients(
            &state.store,
            courier_authority::store::clients::ClientFilter {
                domain: None,
                status: Some(courier_common::identifiers::ClientStatus::Active),
            },
        )
        .await?;
    let events = state.store.recent_audit_events(50).await?;

    Ok(Json(AdminStats {
        active_clients: active.len(),
        recent_audit_events: events
            .into_iter()
            .map(|e| AuditEventSummary {
                actor: e.actor,
                action: e.action,
                subject_id: e.subject_id,
                outcome: e.outcome,
                created_at: e.created_at,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use courier_common::identifiers::MessageStatus;

    use super::*;

    fn crypto() -> crate::state::CryptoContext {
        crate::state::CryptoContext {
            body_key: courier_common::crypto::ear::BodyKey::from_bytes(&[9u8; 32]),
            sender_salt: courier_common::crypto::sender_hash::SenderSalt::new("salt".to_string()),
            jwt_secret: courier_common::crypto::jwt::JwtSecret::from_bytes(b"test-secret-at-least-this-long".to_vec()),
            password_cost: courier_common::crypto::password::PasswordCost::new(12),
        }
    }

    fn record(id: MessageId, status: MessageStatus, delivered_at: Option<chrono::DateTime<Utc>>) -> MessageRecord {
        MessageRecord {
            id,
            client_id: ClientId::new("client_A"),
            sender_hash: "h".repeat(64),
            body_ciphertext: vec![1, 2, 3],
            body_nonce: vec![4, 5, 6],
            status,
            attempt_count: 0,
            created_at: Utc::now(),
            queued_at: Utc::now(),
            delivered_at,
            last_error: None,
            domain_tag: None,
            metadata: None,
        }
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            sender_id: "+12025551234".to_string(),
            body: "hello".to_string(),
            client_id: "client_A".to_string(),
            domain: None,
            message_id: None,
            dedup_key: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn s1_register_encrypts_the_body_and_hashes_the_sender() {
        let mut store = MockMessageDirectory::new();
        let message_id = MessageId::new_v4();
        store.expect_register_message().times(1).returning(move |new| {
            let mut stored = record(message_id, MessageStatus::Queued, None);
            stored.sender_hash = new.sender_hash;
            Ok(stored)
        });

        let response = register_message_core(&store, &crypto(), register_request()).await.unwrap();
        assert_eq!(response.status, "queued");
        assert_ne!(response.sender_hash, "+12025551234");
        assert!(!response.body_sealed_hex.is_empty());
    }

    #[tokio::test]
    async fn s7_register_with_an_explicit_message_id_is_idempotent_at_the_store() {
        let fixed_id = Uuid::new_v4();
        let mut store = MockMessageDirectory::new();
        store
            .expect_register_message()
            .withf(move |new| new.id.as_uuid() == fixed_id)
            .times(1)
            .returning(move |_| Ok(record(MessageId::from(fixed_id), MessageStatus::Queued, None)));

        let mut req = register_request();
        req.message_id = Some(fixed_id);
        let response = register_message_core(&store, &crypto(), req).await.unwrap();
        assert_eq!(response.message_id, fixed_id);
    }

    #[tokio::test]
    async fn deliver_records_an_audit_event_on_success() {
        let message_id = Uuid::new_v4();
        let delivered_at = Utc::now();
        let mut store = MockMessageDirectory::new();
        store
            .expect_mark_delivered()
            .times(1)
            .returning(move |id, _| Ok(record(id, MessageStatus::Delivered, Some(delivered_at))));
        store
            .expect_append_audit_event()
            .withf(|_, action, _, outcome| action == "deliver" && outcome == "delivered")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let response = deliver_message_core(
            &store,
            DeliverRequest { message_id, worker_id: "worker-0".to_string() },
        )
        .await
        .unwrap();

        assert_eq!(response.status, "delivered");
        assert_eq!(response.message_id, message_id);
    }

    #[tokio::test]
    async fn deliver_surfaces_a_store_error_without_writing_an_audit_event() {
        let mut store = MockMessageDirectory::new();
        store.expect_mark_delivered().times(1).returning(|id, _| Err(AuthorityError::MessageNotFound(id.to_string())));
        store.expect_append_audit_event().times(0);

        let result = deliver_message_core(
            &store,
            DeliverRequest { message_id: Uuid::new_v4(), worker_id: "worker-0".to_string() },
        )
        .await;

        assert!(result.is_err());
    }
}
