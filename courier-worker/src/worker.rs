// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The worker loop (§4.7). Each worker is its own `tokio::task`, owns its
//! own `reqwest::Client`-backed [`AuthorityClient`], and observes a shared
//! [`CancellationToken`] at every suspension point — the blocking-pop poll
//! and the retry backoff sleep — so a terminating worker drains cleanly
//! (§5).

use std::{sync::Arc, time::Duration};

use courier_queue::{entry::QueueEntry, DurableQueue};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::authority_client::AuthorityGateway;

/// Narrows the durable queue to the single write `process_entry` performs on
/// the retry path (§4.7 step 5), mocked the same way `AuthorityGateway` is.
#[cfg_attr(test, mockall::automock)]
pub trait RequeueSink: Send + Sync {
    async fn requeue(&self, entry: &QueueEntry) -> Result<(), courier_queue::QueueError>;
}

impl RequeueSink for DurableQueue {
    async fn requeue(&self, entry: &QueueEntry) -> Result<(), courier_queue::QueueError> {
        DurableQueue::requeue(self, entry).await
    }
}

pub struct WorkerConfig {
    pub pop_timeout: Duration,
    pub retry_interval: Duration,
    pub max_attempts: i32,
}

/// Runs one worker's loop until `shutdown` is cancelled. Returns when the
/// loop has drained its current attempt and stopped popping. Generic over
/// [`AuthorityGateway`] so `process_entry`'s branches are testable against a
/// mock (ground: `connect.rs`'s `impl Trait` dispatch); production always
/// instantiates with the real `AuthorityClient`.
pub async fn run<A: AuthorityGateway>(
    worker_id: String,
    queue: DurableQueue,
    authority: Arc<A>,
    config: WorkerConfig,
    shutdown: CancellationToken,
) {
    info!(worker_id, "worker starting");
    loop {
        let popped = tokio::select! {
            _ = shutdown.cancelled() => {
                info!(worker_id, "worker observed shutdown, stopping");
                return;
            }
            result = queue.blocking_pop(config.pop_timeout) => result,
        };

        let entry = match popped {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(err) => {
                warn!(worker_id, %err, "blocking_pop failed, retrying after a short pause");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        process_entry(&worker_id, &queue, &authority, entry, &config, &shutdown).await;
    }
}

async fn process_entry<A: AuthorityGateway, Q: RequeueSink>(
    worker_id: &str,
    queue: &Q,
    authority: &A,
    entry: QueueEntry,
    config: &WorkerConfig,
    shutdown: &CancellationToken,
) {
    let message_id = entry.message_id.as_uuid();

    // Step 2: dead-letter ceiling.
    if entry.attempt_count >= config.max_attempts {
        metrics::counter!("worker_attempts_exceeded_total").increment(1);
        if let Err(err) = authority
            .update_status(message_id, "failed", entry.attempt_count, Some("max attempts exceeded"))
            .await
        {
            warn!(worker_id, %message_id, %err, "failed to record max-attempts failure");
        }
        return;
    }

    let started_at = std::time::Instant::now();

    // Step 3: deliver.
    match authority.mark_delivered(message_id, worker_id).await {
        Ok(_) => {
            metrics::histogram!("worker_delivery_duration_seconds").record(started_at.elapsed().as_secs_f64());
            metrics::counter!("worker_messages_delivered_total").increment(1);
        }
        Err(err) if err.is_not_found() => {
            // Step 7: recovery hole — the message was never registered.
            error!(worker_id, %message_id, "authority has no record of this message, dropping");
        }
        Err(err) if !err.is_retriable() => {
            // Step 6: permanent 4xx other than 404.
            metrics::counter!("worker_permanent_failures_total").increment(1);
            if let Err(update_err) = authority
                .update_status(message_id, "failed", entry.attempt_count, Some(&err.to_string()))
                .await
            {
                warn!(worker_id, %message_id, %update_err, "failed to record permanent failure");
            }
        }
        Err(err) => {
            // Step 5: transport failure or 5xx — requeue after the retry interval.
            if let Err(update_err) = authority
                .update_status(message_id, "queued", entry.attempt_count + 1, Some(&err.to_string()))
                .await
            {
                warn!(worker_id, %message_id, %update_err, "best-effort status update before retry failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(worker_id, %message_id, "shutdown interrupted retry backoff, requeuing immediately");
                }
                _ = tokio::time::sleep(config.retry_interval) => {}
            }

            if let Err(requeue_err) = queue.requeue(&entry).await {
                error!(worker_id, %message_id, %requeue_err, "failed to requeue message after delivery failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use courier_common::identifiers::{ClientId, MessageId};

    use crate::authority_client::{AuthorityClientError, DeliverResponse, MockAuthorityGateway, UpdateStatusResponse};

    use super::*;

    fn config(max_attempts: i32) -> WorkerConfig {
        WorkerConfig {
            pop_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(10),
            max_attempts,
        }
    }

    fn entry(attempt_count: i32) -> QueueEntry {
        let mut entry = QueueEntry::new(MessageId::new_v4(), ClientId::new("client_A"), "a".repeat(64), vec![1, 2, 3]);
        entry.attempt_count = attempt_count;
        entry
    }

    #[test]
    fn dead_letter_ceiling_is_inclusive() {
        let config = config(10);
        assert!(10 >= config.max_attempts);
        assert!(9 < config.max_attempts);
    }

    #[tokio::test]
    async fn dead_letter_ceiling_exceeded_marks_failed_without_delivering() {
        let mut authority = MockAuthorityGateway::new();
        authority.expect_mark_delivered().times(0);
        authority
            .expect_update_status()
            .withf(|_, status, _, _| status == "failed")
            .times(1)
            .returning(|id, _, attempts, _| {
                Ok(UpdateStatusResponse { message_id: id, status: "failed".to_string(), attempt_count: attempts })
            });
        let mut queue = MockRequeueSink::new();
        queue.expect_requeue().times(0);

        process_entry("worker-0", &queue, &authority, entry(10), &config(10), &CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn successful_delivery_records_no_status_update() {
        let mut authority = MockAuthorityGateway::new();
        authority.expect_mark_delivered().times(1).returning(|id, _| {
            Ok(DeliverResponse { message_id: id, status: "delivered".to_string(), delivered_at: Utc::now() })
        });
        authority.expect_update_status().times(0);
        let mut queue = MockRequeueSink::new();
        queue.expect_requeue().times(0);

        process_entry("worker-0", &queue, &authority, entry(0), &config(10), &CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn not_found_drops_the_message_without_updating_or_requeuing() {
        let mut authority = MockAuthorityGateway::new();
        authority
            .expect_mark_delivered()
            .times(1)
            .returning(|_, _| Err(AuthorityClientError::Rejected { status: 404, body: "gone".to_string() }));
        authority.expect_update_status().times(0);
        let mut queue = MockRequeueSink::new();
        queue.expect_requeue().times(0);

        process_entry("worker-0", &queue, &authority, entry(0), &config(10), &CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn permanent_client_error_marks_failed_without_requeuing() {
        let mut authority = MockAuthorityGateway::new();
        authority
            .expect_mark_delivered()
            .times(1)
            .returning(|_, _| Err(AuthorityClientError::Rejected { status: 400, body: "bad request".to_string() }));
        authority
            .expect_update_status()
            .withf(|_, status, _, _| status == "failed")
            .times(1)
            .returning(|id, _, attempts, _| {
                Ok(UpdateStatusResponse { message_id: id, status: "failed".to_string(), attempt_count: attempts })
            });
        let mut queue = MockRequeueSink::new();
        queue.expect_requeue().times(0);

        process_entry("worker-0", &queue, &authority, entry(0), &config(10), &CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn transient_failure_requeues_after_recording_retry_status() {
        let mut authority = MockAuthorityGateway::new();
        authority
            .expect_mark_delivered()
            .times(1)
            .returning(|_, _| Err(AuthorityClientError::Rejected { status: 503, body: "unavailable".to_string() }));
        authority
            .expect_update_status()
            .withf(|_, status, attempts, _| status == "queued" && *attempts == 1)
            .times(1)
            .returning(|id, _, attempts, _| {
                Ok(UpdateStatusResponse { message_id: id, status: "queued".to_string(), attempt_count: attempts })
            });
        let mut queue = MockRequeueSink::new();
        queue.expect_requeue().times(1).returning(|_| Ok(()));

        process_entry("worker-0", &queue, &authority, entry(0), &config(10), &CancellationToken::new()).await;
    }
}
