// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use courier_common::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("message {0} not found")]
    MessageNotFound(String),
    #[error("client {0} not found")]
    ClientNotFound(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("duplicate dedup key")]
    DuplicateDedupKey,
    #[error("client certificate fingerprint unknown or revoked")]
    UnknownOrRevokedFingerprint,
    #[error("certificate issuance failed: {0}")]
    CertificateIssuance(String),
    #[error(transparent)]
    Password(#[from] courier_common::crypto::password::PasswordError),
}

impl From<AuthorityError> for ErrorKind {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Database(e) => ErrorKind::TransientDependency(e.to_string()),
            AuthorityError::MessageNotFound(id) => ErrorKind::NotFound(format!("message {id}")),
            AuthorityError::ClientNotFound(id) => ErrorKind::NotFound(format!("client {id}")),
            AuthorityError::UserNotFound(id) => ErrorKind::NotFound(format!("user {id}")),
            AuthorityError::DuplicateDedupKey => ErrorKind::Conflict("duplicate message".into()),
            AuthorityError::UnknownOrRevokedFingerprint => {
                ErrorKind::Authorization("unknown or revoked client certificate".into())
            }
            AuthorityError::CertificateIssuance(msg) => ErrorKind::Internal(msg),
            AuthorityError::Password(e) => ErrorKind::Internal(e.to_string()),
        }
    }
}
