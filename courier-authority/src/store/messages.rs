// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message repository and state machine (§3, §4.3). `register` is an
//! idempotent `INSERT ... ON CONFLICT DO NOTHING`, falling back to a
//! `SELECT` of the existing row on conflict. `mark_delivered` and
//! `update_status` are conditional `UPDATE ... WHERE status = 'queued'`
//! transitions (ground: `backend/src/qs/queue.rs`'s sequence-number-checked
//! `UPDATE ... RETURNING`), so concurrent workers can never double-mark a
//! message delivered (testable property #6).

use chrono::{DateTime, Utc};
use courier_common::{
    codec::{BlobDecoded, BlobEncoded},
    identifiers::{ClientId, MessageId, MessageStatus},
};
use serde_json::Value;

use super::AuthorityStore;
use crate::error::AuthorityError;

/// Bound on `last_error` length, per the data model invariant in §3.
const LAST_ERROR_MAX_LEN: usize = 2000;

pub struct NewMessage {
    pub id: MessageId,
    pub client_id: ClientId,
    pub sender_hash: String,
    pub body_ciphertext: Vec<u8>,
    pub body_nonce: Vec<u8>,
    pub domain_tag: Option<String>,
    pub dedup_key: Option<String>,
    /// Arbitrary JSON object accepted at the ingress (§6.1), stored as a
    /// `BlobEncoded` blob rather than its own table.
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct MessageRecord {
    pub id: MessageId,
    pub client_id: ClientId,
    pub sender_hash: String,
    pub body_ciphertext: Vec<u8>,
    pub body_nonce: Vec<u8>,
    pub status: MessageStatus,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub domain_tag: Option<String>,
    pub metadata: Option<Value>,
}

/// Authorization scope for `get_for_principal` (§4.3, §6.2): admins see
/// every row, non-admins only rows bound to their own `client_id`.
pub enum Principal {
    Admin,
    ScopedTo(ClientId),
}

#[derive(Clone, Copy, Default)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl AuthorityStore {
    /// `RegisterMessage` (§4.3): idempotent on `message_id`. A repeated
    /// call with the same id returns the original row rather than
    /// inserting a duplicate (testable property / scenario S7).
    pub async fn register_message(&self, new: NewMessage) -> Result<MessageRecord, AuthorityError> {
        let now = Utc::now();
        let row = sqlx::query!(
            r#"
            INSERT INTO messages
                (id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                 attempt_count, created_at, queued_at, domain_tag, dedup_key, metadata_blob)
            VALUES ($1, $2, $3, $4, $5, 'queued', 0, $6, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                      attempt_count, created_at, queued_at, delivered_at, last_error, domain_tag,
                      metadata_blob as "metadata_blob: BlobDecoded<Value>"
            "#,
            new.id.as_uuid(),
            new.client_id.as_str(),
            new.sender_hash,
            new.body_ciphertext,
            new.body_nonce,
            now,
            new.domain_tag,
            new.dedup_key,
            new.metadata.clone().map(BlobEncoded) as Option<BlobEncoded<Value>>,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|err| match err.as_database_error() {
            Some(db_err)
                if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
                    && db_err.constraint() == Some("messages_dedup_key_idx") =>
            {
                AuthorityError::DuplicateDedupKey
            }
            _ => AuthorityError::Database(err),
        })?;

        if let Some(row) = row {
            return Ok(MessageRecord {
                id: MessageId::from(row.id),
                client_id: row.client_id.into(),
                sender_hash: row.sender_hash,
                body_ciphertext: row.body_ciphertext,
                body_nonce: row.body_nonce,
                status: parse_status(&row.status),
                attempt_count: row.attempt_count,
                created_at: row.created_at,
                queued_at: row.queued_at,
                delivered_at: row.delivered_at,
                last_error: row.last_error,
                domain_tag: row.domain_tag,
                metadata: row.metadata_blob.map(BlobDecoded::into_inner),
            });
        }

        // Conflict fired: the row already exists (idempotent register).
        self.get_message(new.id).await
    }

    pub async fn get_message(&self, id: MessageId) -> Result<MessageRecord, AuthorityError> {
        let row = sqlx::query!(
            r#"
            SELECT id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                   attempt_count, created_at, queued_at, delivered_at, last_error, domain_tag,
                   metadata_blob as "metadata_blob: BlobDecoded<Value>"
            FROM messages WHERE id = $1
            "#,
            id.as_uuid(),
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AuthorityError::MessageNotFound(id.to_string()))?;

        Ok(MessageRecord {
            id: MessageId::from(row.id),
            client_id: row.client_id.into(),
            sender_hash: row.sender_hash,
            body_ciphertext: row.body_ciphertext,
            body_nonce: row.body_nonce,
            status: parse_status(&row.status),
            attempt_count: row.attempt_count,
            created_at: row.created_at,
            queued_at: row.queued_at,
            delivered_at: row.delivered_at,
            last_error: row.last_error,
            domain_tag: row.domain_tag,
            metadata: row.metadata_blob.map(BlobDecoded::into_inner),
        })
    }

    /// `MarkDelivered` (§4.3): no-op (zero rows affected) if already
    /// delivered; errors only if the message does not exist at all.
    pub async fn mark_delivered(
        &self,
        id: MessageId,
        delivered_at: DateTime<Utc>,
    ) -> Result<MessageRecord, AuthorityError> {
        let result = sqlx::query!(
            r#"
            UPDATE messages
            SET status = 'delivered', delivered_at = $2
            WHERE id = $1 AND status = 'queued'
            "#,
            id.as_uuid(),
            delivered_at,
        )
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            // Either already delivered, or it never existed — distinguish
            // the two with an existence read (§4.3).
            return self.get_message(id).await;
        }

        self.get_message(id).await
    }

    /// `UpdateStatus` (§4.3/§4.7): advances the attempt counter and,
    /// optionally, the last-error text. `attempt_count` must be
    /// monotonically non-decreasing (§3 invariant) — callers pass the new
    /// value, which this only applies if it is not less than the stored one.
    pub async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        attempt_count: i32,
        error: Option<String>,
    ) -> Result<MessageRecord, AuthorityError> {
        let truncated_error = error.map(|e| truncate(&e, LAST_ERROR_MAX_LEN));
        let status_str = status_str(status);

        sqlx::query!(
            r#"
            UPDATE messages
            SET status = $2,
                attempt_count = GREATEST(attempt_count, $3),
                last_error = COALESCE($4, last_error)
            WHERE id = $1 AND status = 'queued'
            "#,
            id.as_uuid(),
            status_str,
            attempt_count,
            truncated_error,
        )
        .execute(self.pool())
        .await?;

        self.get_message(id).await
    }

    pub async fn get_messages_for_principal(
        &self,
        principal: Principal,
        paging: Paging,
    ) -> Result<Vec<MessageRecord>, AuthorityError> {
        let limit = if paging.limit > 0 { paging.limit } else { 50 };
        let rows = match principal {
            Principal::Admin => {
                sqlx::query!(
                    r#"
                    SELECT id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                           attempt_count, created_at, queued_at, delivered_at, last_error, domain_tag,
                           metadata_blob as "metadata_blob: BlobDecoded<Value>"
                    FROM messages ORDER BY created_at DESC LIMIT $1 OFFSET $2
                    "#,
                    limit,
                    paging.offset,
                )
                .fetch_all(self.pool())
                .await?
            }
            Principal::ScopedTo(client_id) => {
                sqlx::query!(
                    r#"
                    SELECT id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                           attempt_count, created_at, queued_at, delivered_at, last_error, domain_tag,
                           metadata_blob as "metadata_blob: BlobDecoded<Value>"
                    FROM messages WHERE client_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3
                    "#,
                    client_id.as_str(),
                    limit,
                    paging.offset,
                )
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| MessageRecord {
                id: MessageId::from(row.id),
                client_id: row.client_id.into(),
                sender_hash: row.sender_hash,
                body_ciphertext: row.body_ciphertext,
                body_nonce: row.body_nonce,
                status: parse_status(&row.status),
                attempt_count: row.attempt_count,
                created_at: row.created_at,
                queued_at: row.queued_at,
                delivered_at: row.delivered_at,
                last_error: row.last_error,
                domain_tag: row.domain_tag,
                metadata: row.metadata_blob.map(BlobDecoded::into_inner),
            })
            .collect())
    }

    /// Candidates for the reconciliation sweep (§4.3 ADDED, §9 Open
    /// Question 1): messages still `queued` long after they should have
    /// reached the queue.
    pub async fn find_stale_queued(
        &self,
        grace: chrono::Duration,
    ) -> Result<Vec<MessageRecord>, AuthorityError> {
        let cutoff = Utc::now() - grace;
        let rows = sqlx::query!(
            r#"
            SELECT id, client_id, sender_hash, body_ciphertext, body_nonce, status,
                   attempt_count, created_at, queued_at, delivered_at, last_error, domain_tag,
                   metadata_blob as "metadata_blob: BlobDecoded<Value>"
            FROM messages WHERE status = 'queued' AND queued_at < $1
            "#,
            cutoff,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MessageRecord {
                id: MessageId::from(row.id),
                client_id: row.client_id.into(),
                sender_hash: row.sender_hash,
                body_ciphertext: row.body_ciphertext,
                body_nonce: row.body_nonce,
                status: parse_status(&row.status),
                attempt_count: row.attempt_count,
                created_at: row.created_at,
                queued_at: row.queued_at,
                delivered_at: row.delivered_at,
                last_error: row.last_error,
                domain_tag: row.domain_tag,
                metadata: row.metadata_blob.map(BlobDecoded::into_inner),
            })
            .collect())
    }
}

fn parse_status(raw: &str) -> MessageStatus {
    match raw {
        "delivered" => MessageStatus::Delivered,
        "failed" => MessageStatus::Failed,
        _ => MessageStatus::Queued,
    }
}

fn status_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Queued => "queued",
        MessageStatus::Delivered => "delivered",
        MessageStatus::Failed => "failed",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_string() {
        for status in [MessageStatus::Queued, MessageStatus::Delivered, MessageStatus::Failed] {
            assert_eq!(parse_status(status_str(status)), status);
        }
    }

    #[test]
    fn truncate_bounds_last_error_length() {
        let long = "x".repeat(LAST_ERROR_MAX_LEN + 500);
        assert_eq!(truncate(&long, LAST_ERROR_MAX_LEN).chars().count(), LAST_ERROR_MAX_LEN);
    }
}
