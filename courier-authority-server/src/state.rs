// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide dependency context (§9 "construct once at process start,
//! pass explicitly"), shared by every handler via `axum::extract::State`.

use std::sync::Arc;

use courier_authority::{AuthorityStore, CaService};
use courier_common::crypto::{
    ear::BodyKey,
    jwt::JwtSecret,
    password::PasswordCost,
    sender_hash::SenderSalt,
};
use courier_queue::DurableQueue;

#[derive(Clone)]
pub struct CryptoContext {
    pub body_key: BodyKey,
    pub sender_salt: SenderSalt,
    pub jwt_secret: JwtSecret,
    pub password_cost: PasswordCost,
}

#[derive(Clone)]
pub struct AppState {
    pub store: AuthorityStore,
    pub queue: DurableQueue,
    pub ca: Arc<CaService>,
    pub crypto: Arc<CryptoContext>,
}
