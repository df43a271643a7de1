// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared data model, crypto primitives and ambient plumbing used by every
//! crate in the courier workspace.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identifiers;
pub mod mtls;
pub mod telemetry;

pub const DEFAULT_PORT_INGRESS: u16 = 8443;
pub const DEFAULT_PORT_AUTHORITY_INTERNAL: u16 = 8444;
pub const DEFAULT_PORT_AUTHORITY_PORTAL: u16 = 8445;
