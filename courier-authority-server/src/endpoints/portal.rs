// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Portal bearer realm (§4.4, §6.2): human-facing login and message
//! inspection, scoped by the caller's role and (for non-admins) their bound
//! `client_id`.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use courier_authority::store::messages::{MessageRecord, Paging, Principal};
use courier_authority::store::users::UserRecord;
use courier_authority::AuthorityError;
use courier_common::{
    crypto::{jwt::PORTAL_TOKEN_TTL, password::verify_password},
    error::ErrorKind,
    identifiers::{ClientId, Email, MessageId, Role},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, extract::PortalUser, state::{AppState, CryptoContext}};

/// Narrows [`courier_authority::AuthorityStore`] to the reads/writes the
/// portal handlers perform, so they can run against a mocked store instead
/// of a live Postgres connection (ground: `connect.rs`'s
/// `ConnectHandleProtocol` — a single-purpose trait over a wider store,
/// automocked and consumed generically rather than as `dyn`).
#[cfg_attr(test, mockall::automock)]
pub trait PortalDirectory: Send + Sync {
    async fn get_user(&self, email: &Email) -> Result<UserRecord, AuthorityError>;
    async fn record_login(&self, email: &Email) -> Result<(), AuthorityError>;
    async fn get_messages_for_principal(
        &self,
        principal: Principal,
        paging: Paging,
    ) -> Result<Vec<MessageRecord>, AuthorityError>;
    async fn get_message(&self, id: MessageId) -> Result<MessageRecord, AuthorityError>;
}

impl PortalDirectory for courier_authority::AuthorityStore {
    async fn get_user(&self, email: &Email) -> Result<UserRecord, AuthorityError> {
        courier_authority::AuthorityStore::get_user(self, email).await
    }

    async fn record_login(&self, email: &Email) -> Result<(), AuthorityError> {
        courier_authority::AuthorityStore::record_login(self, email).await
    }

    async fn get_messages_for_principal(
        &self,
        principal: Principal,
        paging: Paging,
    ) -> Result<Vec<MessageRecord>, AuthorityError> {
        courier_authority::AuthorityStore::get_messages_for_principal(self, principal, paging).await
    }

    async fn get_message(&self, id: MessageId) -> Result<MessageRecord, AuthorityError> {
        courier_authority::AuthorityStore::get_message(self, id).await
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct UserSummary {
    pub email: String,
    pub role: Role,
    pub client_id: Option<String>,
}

/// `POST /portal/auth/login` (§6.2). No prior auth: verifies the stored
/// Argon2id hash, rejects inactive accounts, and mints a 30-minute token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = login_core(&state.store, &state.crypto, req).await?;
    Ok(Json(response))
}

/// §6.2 login, generic over [`PortalDirectory`] so it can run against a
/// mocked store (scenarios: wrong password, inactive account).
async fn login_core<D: PortalDirectory>(
    store: &D,
    crypto: &CryptoContext,
    req: LoginRequest,
) -> Result<LoginResponse, ApiError> {
    let email = Email::normalize(&req.email);
    let user = store
        .get_user(&email)
        .await
        .map_err(|_| ErrorKind::Authentication("invalid email or password".into()))?;

    if !user.is_active {
        return Err(ErrorKind::Authentication("account is deactivated".into()).into());
    }

    let matches = verify_password(&user.password_hash, &req.password).map_err(ErrorKind::from)?;
    if !matches {
        return Err(ErrorKind::Authentication("invalid email or password".into()).into());
    }

    let token = crypto
        .jwt_secret
        .mint_token(
            email.as_str(),
            user.role,
            user.client_id.as_ref().map(ClientId::as_str),
            PORTAL_TOKEN_TTL,
        )
        .map_err(ErrorKind::from)?;

    store.record_login(&email).await?;

    Ok(LoginResponse {
        access_token: token,
        token_type: "bearer",
        expires_in: PORTAL_TOKEN_TTL.num_seconds(),
        user: UserSummary {
            email: email.as_str().to_string(),
            role: user.role,
            client_id: user.client_id.map(|c| c.as_str().to_string()),
        },
    })
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// `POST /portal/auth/refresh` (§6.2): mints a fresh token from the
/// caller's still-valid claims, without requiring the password again.
pub async fn refresh(
    State(state): State<AppState>,
    caller: PortalUser,
) -> Result<Json<RefreshResponse>, ApiError> {
    let token = state
        .crypto
        .jwt_secret
        .mint_token(
            &caller.claims.sub,
            caller.claims.role,
            caller.claims.client_id.as_deref(),
            PORTAL_TOKEN_TTL,
        )
        .map_err(ErrorKind::from)?;

    Ok(Json(RefreshResponse {
        access_token: token,
        token_type: "bearer",
        expires_in: PORTAL_TOKEN_TTL.num_seconds(),
    }))
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct MessageSummary {
    pub message_id: Uuid,
    pub client_id: String,
    pub status: String,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// `GET /portal/messages` (§6.2): admins see the full stream, non-admins
/// only the messages bound to their own `client_id`.
pub async fn list_messages(
    State(state): State<AppState>,
    caller: PortalUser,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageSummary>>, ApiError> {
    let summaries = list_messages_core(&state.store, &caller, query).await?;
    Ok(Json(summaries))
}

/// §6.2 scenario S6: admin-vs-scoped-user message visibility, generic over
/// [`PortalDirectory`].
async fn list_messages_core<D: PortalDirectory>(
    store: &D,
    caller: &PortalUser,
    query: ListMessagesQuery,
) -> Result<Vec<MessageSummary>, ApiError> {
    let principal = principal_for(caller)?;
    let records = store
        .get_messages_for_principal(
            principal,
            Paging {
                limit: query.limit.unwrap_or(0),
                offset: query.offset.unwrap_or(0),
            },
        )
        .await?;

    Ok(records.into_iter().map(summarize).collect())
}

/// `GET /portal/messages/{id}` (§6.2): 403 if a non-admin requests a
/// message bound to a different client.
pub async fn get_message(
    State(state): State<AppState>,
    caller: PortalUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageSummary>, ApiError> {
    let summary = get_message_core(&state.store, &caller, message_id).await?;
    Ok(Json(summary))
}

async fn get_message_core<D: PortalDirectory>(
    store: &D,
    caller: &PortalUser,
    message_id: Uuid,
) -> Result<MessageSummary, ApiError> {
    let record = store.get_message(MessageId::from(message_id)).await?;

    if caller.claims.role != Role::Admin {
        let bound = caller.claims.client_id.as_deref();
        if bound != Some(record.client_id.as_str()) {
            return Err(ErrorKind::Authorization(
                "message is not bound to the caller's client_id".into(),
            )
            .into());
        }
    }

    Ok(summarize(record))
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub email: String,
    pub role: Role,
    pub client_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

/// `GET /portal/profile` (§6.2).
pub async fn profile(
    State(state): State<AppState>,
    caller: PortalUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let email = Email::normalize(&caller.claims.sub);
    let user = state.store.get_user(&email).await?;

    Ok(Json(ProfileResponse {
        email: email.as_str().to_string(),
        role: user.role,
        client_id: user.client_id.map(|c| c.as_str().to_string()),
        last_login: user.last_login,
    }))
}

fn principal_for(caller: &PortalUser) -> Result<Principal, ApiError> {
    match caller.claims.role {
        Role::Admin => Ok(Principal::Admin),
        Role::User => {
            let client_id = caller
                .claims
                .client_id
                .clone()
                .ok_or_else(|| ErrorKind::Authorization("account has no bound client_id".into()))?;
            Ok(Principal::ScopedTo(ClientId::new(client_id)))
        }
    }
}

fn summarize(record: MessageRecord) -> MessageSummary {
    MessageSummary {
        message_id: record.id.as_uuid(),
        client_id: record.client_id.as_str().to_string(),
        status: format!("{:?}", record.status).to_lowercase(),
        attempt_count: record.attempt_count,
        created_at: record.created_at,
        delivered_at: record.delivered_at,
    }
}

#[cfg(test)]
mod tests {
    use courier_common::crypto::{
        ear::BodyKey, jwt::JwtSecret, password::{hash_password, PasswordCost}, sender_hash::SenderSalt,
    };
    use courier_common::identifiers::MessageStatus;

    use crate::extract::PortalUser;

    use super::*;

    fn crypto() -> CryptoContext {
        CryptoContext {
            body_key: BodyKey::from_bytes(&[7u8; 32]),
            sender_salt: SenderSalt::new("salt".to_string()),
            jwt_secret: JwtSecret::from_bytes(b"test-secret-at-least-this-long".to_vec()),
            password_cost: PasswordCost::new(12),
        }
    }

    fn user(email: &str, role: Role, client_id: Option<&str>, password_hash: String) -> UserRecord {
        UserRecord {
            email: Email::normalize(email),
            password_hash,
            role,
            client_id: client_id.map(ClientId::new),
            is_active: true,
            last_login: None,
        }
    }

    fn message(id: Uuid, client_id: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::from(id),
            client_id: ClientId::new(client_id),
            sender_hash: "h".repeat(64),
            body_ciphertext: vec![1, 2, 3],
            body_nonce: vec![4, 5, 6],
            status: MessageStatus::Queued,
            attempt_count: 0,
            created_at: Utc::now(),
            queued_at: Utc::now(),
            delivered_at: None,
            last_error: None,
            domain_tag: None,
            metadata: None,
        }
    }

    fn caller(role: Role, client_id: Option<&str>) -> PortalUser {
        PortalUser {
            claims: courier_common::crypto::jwt::Claims {
                sub: "user@example.com".to_string(),
                role,
                client_id: client_id.map(str::to_string),
                iat: Utc::now().timestamp(),
                exp: Utc::now().timestamp() + 1800,
            },
        }
    }

    #[tokio::test]
    async fn login_succeeds_with_the_correct_password_and_mints_a_token() {
        let hash = hash_password("correct horse", PasswordCost::new(12)).unwrap();
        let mut store = MockPortalDirectory::new();
        store.expect_get_user().times(1).returning(move |_| Ok(user("user@example.com", Role::User, Some("client_A"), hash.clone())));
        store.expect_record_login().times(1).returning(|_| Ok(()));

        let response = login_core(
            &store,
            &crypto(),
            LoginRequest { email: "user@example.com".to_string(), password: "correct horse".to_string() },
        )
        .await
        .expect("correct password succeeds");

        assert_eq!(response.user.client_id.as_deref(), Some("client_A"));
        assert!(!response.access_token.is_empty());
    }

    #[tokio::test]
    async fn login_rejects_the_wrong_password_without_recording_a_login() {
        let hash = hash_password("correct horse", PasswordCost::new(12)).unwrap();
        let mut store = MockPortalDirectory::new();
        store.expect_get_user().times(1).returning(move |_| Ok(user("user@example.com", Role::User, None, hash.clone())));
        store.expect_record_login().times(0);

        let result = login_core(
            &store,
            &crypto(),
            LoginRequest { email: "user@example.com".to_string(), password: "wrong".to_string() },
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn login_rejects_a_deactivated_account() {
        let hash = hash_password("correct horse", PasswordCost::new(12)).unwrap();
        let mut store = MockPortalDirectory::new();
        store.expect_get_user().times(1).returning(move |_| {
            let mut record = user("user@example.com", Role::User, None, hash.clone());
            record.is_active = false;
            Ok(record)
        });
        store.expect_record_login().times(0);

        let result = login_core(
            &store,
            &crypto(),
            LoginRequest { email: "user@example.com".to_string(), password: "correct horse".to_string() },
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn s6_admin_sees_the_full_stream() {
        let mut store = MockPortalDirectory::new();
        store
            .expect_get_messages_for_principal()
            .withf(|principal, _| matches!(principal, Principal::Admin))
            .times(1)
            .returning(|_, _| Ok(vec![message(Uuid::new_v4(), "client_A"), message(Uuid::new_v4(), "client_B")]));

        let summaries = list_messages_core(&store, &caller(Role::Admin, None), ListMessagesQuery { limit: None, offset: None })
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
    }

    #[tokio::test]
    async fn s6_non_admin_is_scoped_to_their_own_client_id() {
        let mut store = MockPortalDirectory::new();
        store
            .expect_get_messages_for_principal()
            .withf(|principal, _| matches!(principal, Principal::ScopedTo(id) if id.as_str() == "client_A"))
            .times(1)
            .returning(|_, _| Ok(vec![message(Uuid::new_v4(), "client_A")]));

        let summaries = list_messages_core(
            &store,
            &caller(Role::User, Some("client_A")),
            ListMessagesQuery { limit: None, offset: None },
        )
        .await
        .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].client_id, "client_A");
    }

    #[tokio::test]
    async fn non_admin_without_a_bound_client_id_is_rejected() {
        let store = MockPortalDirectory::new();
        let result = list_messages_core(&store, &caller(Role::User, None), ListMessagesQuery { limit: None, offset: None }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_message_forbids_cross_client_access() {
        let message_id = Uuid::new_v4();
        let mut store = MockPortalDirectory::new();
        store.expect_get_message().times(1).returning(move |_| Ok(message(message_id, "client_B")));

        let result = get_message_core(&store, &caller(Role::User, Some("client_A")), message_id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_message_allows_admin_regardless_of_binding() {
        let message_id = Uuid::new_v4();
        let mut store = MockPortalDirectory::new();
        store.expect_get_message().times(1).returning(move |_| Ok(message(message_id, "client_B")));

        let summary = get_message_core(&store, &caller(Role::Admin, None), message_id).await.unwrap();
        assert_eq!(summary.client_id, "client_B");
    }
}
