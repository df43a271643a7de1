// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reconciliation sweep (§9 Open Question 1, §4.3 ADDED): the ingress has
//! two write paths to the same message — `register` at the authority and
//! `enqueue` at the durable queue. A crash between the two can leave a
//! `messages` row stuck `queued` with no matching queue entry, which would
//! otherwise never be delivered. A background task re-publishes any row
//! that has sat `queued` past a grace period.
//!
//! Ground: the `tokio::spawn` background-task idiom the teacher uses for
//! its websocket dispatch notifier (`server/src/ws`).

use std::time::Duration;

use courier_common::crypto::ear::Ciphertext;
use courier_queue::{entry::QueueEntry, DurableQueue};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::AuthorityStore;

/// Spawns the periodic sweep as a background task. Returns immediately;
/// the task runs until `shutdown` is cancelled.
pub fn spawn(
    store: AuthorityStore,
    queue: DurableQueue,
    interval: Duration,
    grace: chrono::Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, queue, interval, grace, shutdown).await;
    })
}

async fn run(
    store: AuthorityStore,
    queue: DurableQueue,
    interval: Duration,
    grace: chrono::Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("reconciliation sweep shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(err) = sweep_once(&store, &queue, grace).await {
            warn!(%err, "reconciliation sweep pass failed");
        }
    }
}

/// Runs a single sweep pass: finds `messages` rows that have been `queued`
/// longer than `grace` and re-publishes each into the durable queue. A
/// message that reaches the queue twice (the original, un-crashed enqueue
/// plus this sweep's re-publish) is harmless — at-least-once delivery and
/// the conditional `mark_delivered` update already tolerate duplicates.
async fn sweep_once(
    store: &AuthorityStore,
    queue: &DurableQueue,
    grace: chrono::Duration,
) -> Result<(), crate::error::AuthorityError> {
    let stale = store.find_stale_queued(grace).await?;
    if stale.is_empty() {
        return Ok(());
    }

    info!(count = stale.len(), "reconciliation sweep re-publishing stale rows");
    for message in stale {
        let Ok(nonce) = message.body_nonce.clone().try_into() else {
            warn!(message_id = %message.id, "reconciliation sweep found malformed nonce, skipping");
            continue;
        };
        let packed = Ciphertext {
            ciphertext: message.body_ciphertext.clone(),
            nonce,
        }
        .into_bytes();
        let mut entry = QueueEntry::new(
            message.id,
            message.client_id.clone(),
            message.sender_hash.clone(),
            packed,
        );
        entry.attempt_count = message.attempt_count;
        if let Err(err) = queue.enqueue(&entry).await {
            warn!(message_id = %message.id, %err, "reconciliation sweep failed to re-publish");
            continue;
        }
        store
            .append_audit_event(crate::store::audit::AuditEvent {
                actor: "reconciliation_sweep",
                action: "republish",
                subject_id: &message.id.to_string(),
                outcome: "republished",
            })
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_and_grace_are_distinct_knobs() {
        // The sweep cadence (`interval`) and the staleness threshold
        // (`grace`) are independently configurable per §4.9; a short
        // interval with a long grace polls often but re-publishes rarely.
        assert_ne!(Duration::from_secs(30), Duration::from_secs(120));
    }
}
