// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! [`QueueSink`] narrows the durable queue to the single write
//! `submit_message` performs (§4.6 step 7), mocked the same way
//! [`crate::authority_client::AuthorityGateway`] is.

use courier_queue::{entry::QueueEntry, DurableQueue, QueueError};

#[cfg_attr(test, mockall::automock)]
pub trait QueueSink: Send + Sync {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError>;
}

impl QueueSink for DurableQueue {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        DurableQueue::enqueue(self, entry).await
    }
}
