// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `IngressClient`: the caller's identity on the ingress's single mTLS
//! listener, resolved from the TLS-verified leaf certificate's fingerprint
//! via the authority's CA-service-backed lookup (§4.6 step 2). Ground:
//! `courier-authority-server`'s `MtlsClient` extractor, generalized from an
//! in-process CA lookup to a call over the internal mTLS channel.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use courier_common::{error::ErrorKind, identifiers::ClientId, mtls::PeerIdentity};

use crate::{authority_client::AuthorityGateway, error::ApiError, state::AppState};

pub struct IngressClient {
    pub client_id: ClientId,
}

impl<S> FromRequestParts<S> for IngressClient
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
        let client_id = resolve_client_id(&*app_state.authority, &peer.fingerprint).await?;
        Ok(IngressClient { client_id })
    }
}

/// The fingerprint-to-`client_id` resolution at the core of §4.6 step 2,
/// pulled out of `from_request_parts` so it can run against a mocked
/// [`AuthorityGateway`] without an axum request (§8 scenario S3: a
/// revoked/expired/unknown certificate is rejected here).
async fn resolve_client_id(authority: &impl AuthorityGateway, fingerprint: &str) -> Result<ClientId, ApiError> {
    Ok(authority.lookup_client(fingerprint).await?)
}

#[cfg(test)]
mod tests {
    use crate::authority_client::{AuthorityClientError, MockAuthorityGateway};

    use super::*;

    #[tokio::test]
    async fn unknown_or_revoked_fingerprint_is_rejected() {
        let mut authority = MockAuthorityGateway::new();
        authority.expect_lookup_client().times(1).returning(|_| {
            Err(AuthorityClientError::Rejected { status: 403, body: "revoked".to_string() })
        });

        let result = resolve_client_id(&authority, "revoked-fingerprint").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn known_fingerprint_resolves_to_its_client_id() {
        let mut authority = MockAuthorityGateway::new();
        authority
            .expect_lookup_client()
            .times(1)
            .returning(|_| Ok(ClientId::new("client_A")));

        let client_id = resolve_client_id(&authority, "abc123").await.unwrap();
        assert_eq!(client_id, ClientId::new("client_A"));
    }
}
