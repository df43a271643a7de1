// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The queue entry shape (§3 "Queue entry"). Only the sender hash ever
//! travels through the queue — the ingress passes the raw sender to the
//! authority for registration and nowhere else (§9 Open Question 4).

use chrono::{DateTime, Utc};
use courier_common::identifiers::{ClientId, MessageId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub sender_hash: String,
    pub body_ciphertext: Vec<u8>,
    pub attempt_count: i32,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Builds a fresh queue entry for a newly registered message
    /// (attempt_count starts at zero).
    pub fn new(
        message_id: MessageId,
        client_id: ClientId,
        sender_hash: String,
        body_ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            message_id,
            client_id,
            sender_hash,
            body_ciphertext,
            attempt_count: 0,
            queued_at: Utc::now(),
        }
    }

    /// Returns a copy with the attempt counter incremented, ready to be
    /// requeued at the tail (§4.7 step 5).
    pub fn with_incremented_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt_count += 1;
        next
    }
}
