// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod internal;
pub mod portal;

use courier_common::{error::ErrorKind, identifiers::ClientId};

use crate::{error::ApiError, state::AppState};

/// Coarse per-certificate audience tag (§4.4 "authorizes by role"). Client
/// certificates carry no role column of their own; the `domain` a cert was
/// issued against doubles as its audience, assigned at issuance time by
/// whichever operator runs `--bootstrap-ca` or `/admin/certificates/generate`.
pub const AUDIENCE_INGRESS: &str = "ingress";
pub const AUDIENCE_WORKER: &str = "worker";
pub const AUDIENCE_ADMIN: &str = "admin";

/// Enforces that `client_id`'s certificate was issued for `audience`,
/// rejecting with 403 otherwise (§4.4 "authorizes by role").
pub async fn require_audience(
    state: &AppState,
    client_id: &ClientId,
    audience: &str,
) -> Result<(), ApiError> {
    let client = state.store.get_client(client_id).await?;
    if client.domain != audience {
        return Err(ErrorKind::Authorization(format!(
            "{client_id} is not authorized for the {audience} audience"
        ))
        .into());
    }
    Ok(())
}
