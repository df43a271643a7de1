// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client CRUD (§3 "Client"). `status` transitions to `expired` lazily on
//! read, never via a background job — matching the spec's "transitions to
//! expired lazily on access after expiry" lifecycle note.

use chrono::{DateTime, Utc};
use courier_common::identifiers::{ClientId, ClientStatus};

use super::AuthorityStore;
use crate::error::AuthorityError;

#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub cert_fingerprint: String,
    pub domain: String,
    pub status: ClientStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Applies the lazy active->expired transition for read paths (§3).
    pub fn effective_status(&self) -> ClientStatus {
        if matches!(self.status, ClientStatus::Active) && self.expires_at <= Utc::now() {
            ClientStatus::Expired
        } else {
            self.status
        }
    }
}

pub struct NewClient {
    pub client_id: ClientId,
    pub cert_fingerprint: String,
    pub domain: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ClientFilter {
    pub domain: Option<String>,
    pub status: Option<ClientStatus>,
}

/// Mirrors `messages::Paging` (§4.3 `GetMessagesForPrincipal(principal,
/// filter, paging)`): `limit <= 0` falls back to a default page size.
#[derive(Clone, Copy)]
pub struct ClientPaging {
    pub limit: i64,
    pub offset: i64,
}

impl Default for ClientPaging {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

impl AuthorityStore {
    pub async fn insert_client(&self, new: NewClient) -> Result<ClientRecord, AuthorityError> {
        sqlx::query!(
            r#"
            INSERT INTO clients (client_id, cert_fingerprint, domain, status, issued_at, expires_at)
            VALUES ($1, $2, $3, 'active', $4, $5)
            "#,
            new.client_id.as_str(),
            new.cert_fingerprint,
            new.domain,
            new.issued_at,
            new.expires_at,
        )
        .execute(self.pool())
        .await?;

        self.get_client(&new.client_id).await
    }

    pub async fn get_client(&self, client_id: &ClientId) -> Result<ClientRecord, AuthorityError> {
        let row = sqlx::query!(
            r#"SELECT client_id, cert_fingerprint, domain, status, issued_at, expires_at
               FROM clients WHERE client_id = $1"#,
            client_id.as_str(),
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AuthorityError::ClientNotFound(client_id.to_string()))?;

        Ok(ClientRecord {
            client_id: row.client_id.into(),
            cert_fingerprint: row.cert_fingerprint,
            domain: row.domain,
            status: parse_status(&row.status),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }

    /// Looks a client up by its normalized certificate fingerprint — the
    /// sole key used by mTLS authorization (§4.2, Design Notes §9).
    pub async fn get_client_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<ClientRecord, AuthorityError> {
        let row = sqlx::query!(
            r#"SELECT client_id, cert_fingerprint, domain, status, issued_at, expires_at
               FROM clients WHERE cert_fingerprint = $1"#,
            fingerprint,
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or(AuthorityError::UnknownOrRevokedFingerprint)?;

        Ok(ClientRecord {
            client_id: row.client_id.into(),
            cert_fingerprint: row.cert_fingerprint,
            domain: row.domain,
            status: parse_status(&row.status),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }

    pub async fn revoke_client(&self, client_id: &ClientId) -> Result<ClientRecord, AuthorityError> {
        sqlx::query!(
            "UPDATE clients SET status = 'revoked' WHERE client_id = $1",
            client_id.as_str(),
        )
        .execute(self.pool())
        .await?;
        self.get_client(client_id).await
    }

    pub async fn list_clients(&self, filter: ClientFilter) -> Result<Vec<ClientRecord>, AuthorityError> {
        self.list_clients_paged(filter, ClientPaging::default()).await
    }

    /// `ListClients(filter)` (§4.2, §6.2 "with paging").
    pub async fn list_clients_paged(
        &self,
        filter: ClientFilter,
        paging: ClientPaging,
    ) -> Result<Vec<ClientRecord>, AuthorityError> {
        let limit = if paging.limit > 0 { paging.limit } else { 50 };
        let rows = sqlx::query!(
            r#"
            SELECT client_id, cert_fingerprint, domain, status, issued_at, expires_at
            FROM clients
            WHERE ($1::text IS NULL OR domain = $1) AND ($2::text IS NULL OR status = $2)
            ORDER BY issued_at DESC
            LIMIT $3 OFFSET $4
            "#,
            filter.domain,
            filter.status.map(status_str),
            limit,
            paging.offset,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClientRecord {
                client_id: row.client_id.into(),
                cert_fingerprint: row.cert_fingerprint,
                domain: row.domain,
                status: parse_status(&row.status),
                issued_at: row.issued_at,
                expires_at: row.expires_at,
            })
            .collect())
    }

    /// `ListExpiring` (§4.2): active clients whose certificate expires
    /// within `days`.
    pub async fn list_expiring(&self, days: i64) -> Result<Vec<ClientRecord>, AuthorityError> {
        let cutoff = Utc::now() + chrono::Duration::days(days);
        let rows = sqlx::query!(
            r#"
            SELECT client_id, cert_fingerprint, domain, status, issued_at, expires_at
            FROM clients WHERE status = 'active' AND expires_at < $1
            ORDER BY expires_at ASC
            "#,
            cutoff,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClientRecord {
                client_id: row.client_id.into(),
                cert_fingerprint: row.cert_fingerprint,
                domain: row.domain,
                status: parse_status(&row.status),
                issued_at: row.issued_at,
                expires_at: row.expires_at,
            })
            .collect())
    }
}

fn parse_status(raw: &str) -> ClientStatus {
    match raw {
        "revoked" => ClientStatus::Revoked,
        "expired" => ClientStatus::Expired,
        _ => ClientStatus::Active,
    }
}

fn status_str(status: ClientStatus) -> &'static str {
    match status {
        ClientStatus::Active => "active",
        ClientStatus::Revoked => "revoked",
        ClientStatus::Expired => "expired",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_status_applies_lazily_past_expiry() {
        let record = ClientRecord {
            client_id: ClientId::new("client_A"),
            cert_fingerprint: "f".repeat(64),
            domain: "example.com".into(),
            status: ClientStatus::Active,
            issued_at: Utc::now() - chrono::Duration::days(400),
            expires_at: Utc::now() - chrono::Duration::days(1),
        };
        assert_eq!(record.effective_status(), ClientStatus::Expired);
    }

    #[test]
    fn revoked_status_is_never_downgraded() {
        let record = ClientRecord {
            client_id: ClientId::new("client_A"),
            cert_fingerprint: "f".repeat(64),
            domain: "example.com".into(),
            status: ClientStatus::Revoked,
            issued_at: Utc::now() - chrono::Duration::days(1),
            expires_at: Utc::now() + chrono::Duration::days(300),
        };
        assert_eq!(record.effective_status(), ClientStatus::Revoked);
    }
}
