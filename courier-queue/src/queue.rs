// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable FIFO queue (§4.5). `blocking_pop` is `SELECT ... FOR UPDATE SKIP
//! LOCKED` wrapped in a transaction that deletes the row it selected — the
//! same "atomic pop, no duplicate dispatch" shape the authority's
//! conditional `UPDATE ... WHERE status = 'queued'` gives message state,
//! adapted here to row-level locking for queue semantics.

use std::time::Duration;

use courier_common::identifiers::MessageId;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};

use crate::{entry::QueueEntry, error::QueueError};

/// Interval between empty-queue polls inside [`DurableQueue::blocking_pop`].
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct DurableQueue {
    pool: PgPool,
}

impl DurableQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| QueueError::Database(sqlx::Error::Migrate(Box::new(err))))
    }

    /// Durable push (§4.5). A plain `INSERT`; Postgres's WAL fsync on commit
    /// bounds data loss to at most one second of inflight enqueues under the
    /// default `synchronous_commit` setting.
    pub async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        sqlx::query!(
            r#"
            INSERT INTO queue_entries
                (message_id, client_id, sender_hash, body_ciphertext, attempt_count, queued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            entry.message_id.as_uuid(),
            entry.client_id.as_str(),
            entry.sender_hash,
            entry.body_ciphertext,
            entry.attempt_count,
            entry.queued_at,
        )
        .execute(&self.pool)
        .await?;
        info!(message_id = %entry.message_id, "enqueued");
        Ok(())
    }

    /// Re-inserts `entry` with an incremented attempt counter at the tail of
    /// the queue (a fresh, larger `sequence_number`), per §4.7 step 5.
    pub async fn requeue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let next = entry.with_incremented_attempt();
        self.enqueue(&next).await
    }

    /// Atomically pops the oldest entry, polling until `timeout` elapses.
    /// Multiple concurrent callers never receive the same entry: the
    /// `SELECT ... FOR UPDATE SKIP LOCKED` + delete happens in one
    /// transaction.
    pub async fn blocking_pop(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(entry) = self.try_pop_once().await? {
                return Ok(Some(entry));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(
                deadline.saturating_duration_since(tokio::time::Instant::now()),
            ))
            .await;
        }
    }

    async fn try_pop_once(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let row = sqlx::query!(
            r#"
            SELECT message_id, client_id, sender_hash, body_ciphertext, attempt_count, queued_at
            FROM queue_entries
            ORDER BY sequence_number ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query!(
            "DELETE FROM queue_entries WHERE message_id = $1",
            row.message_id,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(QueueEntry {
            message_id: MessageId::from(row.message_id),
            client_id: row.client_id.into(),
            sender_hash: row.sender_hash,
            body_ciphertext: row.body_ciphertext,
            attempt_count: row.attempt_count,
            queued_at: row.queued_at,
        }))
    }

    /// Instantaneous, advisory-only depth (§4.5).
    pub async fn size(&self) -> Result<i64, QueueError> {
        let count = sqlx::query_scalar!("SELECT COUNT(*) FROM queue_entries")
            .fetch_one(&self.pool)
            .await?;
        count.ok_or_else(|| {
            warn!("queue size query returned NULL count");
            QueueError::Library
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::identifiers::ClientId;

    fn sample_entry() -> QueueEntry {
        QueueEntry::new(
            MessageId::new_v4(),
            ClientId::new("client_A"),
            "a".repeat(64),
            vec![1, 2, 3],
        )
    }

    #[test]
    fn requeue_increments_attempt_count_and_moves_to_tail() {
        let entry = sample_entry();
        let requeued = entry.with_incremented_attempt();
        assert_eq!(requeued.attempt_count, entry.attempt_count + 1);
        assert_eq!(requeued.message_id, entry.message_id);
    }
}
