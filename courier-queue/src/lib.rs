// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable queue (C5) and shared rate limiter (C8). Both are Postgres-backed
//! so either can be shared across stateless ingress instances.

pub mod entry;
pub mod error;
pub mod queue;
pub mod rate_limiter;

pub use entry::QueueEntry;
pub use error::QueueError;
pub use queue::DurableQueue;
