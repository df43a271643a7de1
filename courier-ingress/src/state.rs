// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide dependency context for the ingress gate (§9 "construct once
//! at process start, pass explicitly"). The ingress holds no store of its
//! own beyond the durable queue and the shared rate-limit allowances table.
//!
//! Generic over the authority/queue/rate-limit-storage dependencies so
//! handler-core logic can run against mocks in tests (ground: `connect.rs`'s
//! `impl ConnectHandleProtocol` dispatch) while production wiring in
//! `main.rs` always resolves to the concrete default types.

use std::{sync::Arc, time::Instant};

use courier_queue::{
    rate_limiter::{provider::RLPostgresStorage, RateLimiter, StorageProvider},
    DurableQueue,
};

use crate::{authority_client::{AuthorityClient, AuthorityGateway}, queue_sink::QueueSink};

#[derive(Clone)]
pub struct AppState<A = AuthorityClient, Q = DurableQueue, S = RLPostgresStorage>
where
    A: AuthorityGateway + Send + Sync + 'static,
    Q: QueueSink + Send + Sync + 'static,
    S: StorageProvider + Send + Sync + 'static,
{
    pub queue: Arc<Q>,
    pub rate_limiter: Arc<RateLimiter<S>>,
    pub authority: Arc<A>,
    pub started_at: Instant,
}

impl<A, Q, S> AppState<A, Q, S>
where
    A: AuthorityGateway + Send + Sync + 'static,
    Q: QueueSink + Send + Sync + 'static,
    S: StorageProvider + Send + Sync + 'static,
{
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
