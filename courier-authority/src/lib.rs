// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authority store (C3) and CA service (C2): the only component that
//! touches the relational store. Exposes repository operations and the
//! message state machine to `courier-authority-server`.

pub mod ca;
pub mod error;
pub mod reconciliation;
pub mod settings;
pub mod store;

pub use ca::CaService;
pub use error::AuthorityError;
pub use settings::{AuthoritySettings, TlsSettings};
pub use store::AuthorityStore;
