// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authentication extractors for the two realms of §4.4: the internal mTLS
//! realm derives a [`MtlsClient`] from the connection's verified peer
//! certificate; the portal realm derives a [`PortalUser`] from a bearer
//! token. Both run before any handler body executes, via `FromRequestParts`
//! (ground: `identity_server`'s extractor-based auth idiom).

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use courier_common::{crypto::jwt::Claims, error::ErrorKind, identifiers::ClientId, mtls::PeerIdentity};

use crate::{error::ApiError, state::AppState};

/// The caller's identity on the internal mTLS realm, resolved from the
/// TLS-verified leaf certificate's fingerprint via the CA service (§4.2,
/// §4.4 "derives the caller's client_id from the fingerprint").
pub struct MtlsClient {
    pub client_id: ClientId,
}

impl<S> FromRequestParts<S> for MtlsClient
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<PeerIdentity>()
            .ok_or_else(|| ErrorKind::Authentication("no client certificate presented".into()))?
            .clone();
        let app_state = AppState::from_ref(state);
        let client_id = app_state
            .ca
            .validate_fingerprint(&app_state.store, &peer.fingerprint)
            .await?;
        Ok(MtlsClient { client_id })
    }
}

/// The caller's identity on the portal realm, resolved from a verified
/// bearer token (§6.2 "Token: HMAC-SHA-256 ... carries subject, role,
/// optional client_id").
pub struct PortalUser {
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for PortalUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ErrorKind::Authentication("missing or malformed bearer token".into()))?;
        let app_state = AppState::from_ref(state);
        let claims = app_state
            .crypto
            .jwt_secret
            .verify_token(bearer.token())
            .map_err(ErrorKind::from)?;
        Ok(PortalUser { claims })
    }
}
