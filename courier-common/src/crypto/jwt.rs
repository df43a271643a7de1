// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HMAC-SHA-256 portal session tokens (§4.1, §6.2). Claims carry the
//! subject, role, an optional client binding, issue time and expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::Role;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed or signature verification failed")]
    Invalid,
    #[error("token is expired")]
    Expired,
}

/// Claims carried by every portal bearer token (§6.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's normalized email.
    pub sub: String,
    pub role: Role,
    pub client_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtSecret(Vec<u8>);

impl JwtSecret {
    pub fn from_bytes(secret: Vec<u8>) -> Self {
        Self(secret)
    }

    /// Mints an HS256 token for `subject`/`role`/`client_id` valid for `ttl`.
    pub fn mint_token(
        &self,
        subject: &str,
        role: Role,
        client_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            client_id: client_id.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.0),
        )
        .map_err(|_| TokenError::Invalid)
    }

    /// Verifies a token's signature and expiry, returning its claims.
    /// A token exactly at its expiry second is rejected (§8 boundary).
    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.0),
            &validation,
        )
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;
        Ok(data.claims)
    }
}

/// Default portal token lifetime, per §6.2.
pub const PORTAL_TOKEN_TTL: Duration = Duration::minutes(30);

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> JwtSecret {
        JwtSecret::from_bytes(b"test-secret-at-least-this-long".to_vec())
    }

    #[test]
    fn round_trips_claims() {
        let token = secret()
            .mint_token("user@example.com", Role::User, Some("client_A"), Duration::minutes(30))
            .unwrap();
        let claims = secret().verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user@example.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.client_id.as_deref(), Some("client_A"));
    }

    #[test]
    fn rejects_expired_token() {
        let token = secret()
            .mint_token("user@example.com", Role::Admin, None, Duration::seconds(-1))
            .unwrap();
        assert!(matches!(secret().verify_token(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn rejects_tampered_signature() {
        let token = secret()
            .mint_token("user@example.com", Role::User, None, Duration::minutes(5))
            .unwrap();
        let other = JwtSecret::from_bytes(b"a-completely-different-secret!!".to_vec());
        assert!(matches!(other.verify_token(&token), Err(TokenError::Invalid)));
    }
}
