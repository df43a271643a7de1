// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `GET /api/v1/health` (§6.1): aggregates three independent checks — queue
//! reachability, authority reachability, and the ingress's own listening
//! certificate not being expired — each bounded by its own timeout so one
//! slow dependency doesn't hang the whole probe.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{authority_client::AuthorityClientError, settings::IngressTlsSettings, state::AppState};

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub checks: Checks,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct Checks {
    pub queue: CheckStatus,
    pub authority: CheckStatus,
    pub certificate: CheckStatus,
}

#[derive(Serialize, PartialEq, Eq, Clone, Copy)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

#[derive(Serialize)]
pub enum OverallStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

pub async fn health(
    State(state): State<AppState>,
    axum::extract::Extension(tls): axum::extract::Extension<std::sync::Arc<IngressTlsSettings>>,
) -> (StatusCode, Json<HealthReport>) {
    let queue = check_queue(&state).await;
    let authority = check_authority(&state).await;
    let certificate = check_certificate(&tls);

    let failures = [queue, authority, certificate]
        .iter()
        .filter(|c| **c == CheckStatus::Error)
        .count();

    // certificate expiry alone is degraded (the listener still accepts
    // connections); queue or authority unreachable is unhealthy since the
    // ingress cannot do its job at all.
    let (status, code) = match (failures, queue, authority) {
        (0, _, _) => (OverallStatus::Healthy, StatusCode::OK),
        (_, CheckStatus::Ok, CheckStatus::Ok) => (OverallStatus::Degraded, StatusCode::OK),
        _ => (OverallStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE),
    };

    (
        code,
        Json(HealthReport {
            status,
            checks: Checks {
                queue,
                authority,
                certificate,
            },
            uptime_seconds: state.uptime_seconds(),
        }),
    )
}

async fn check_queue(state: &AppState) -> CheckStatus {
    match tokio::time::timeout(CHECK_TIMEOUT, state.queue.size()).await {
        Ok(Ok(_)) => CheckStatus::Ok,
        _ => CheckStatus::Error,
    }
}

async fn check_authority(state: &AppState) -> CheckStatus {
    let probe = state.authority.lookup_client("healthcheck-sentinel");
    match tokio::time::timeout(CHECK_TIMEOUT, probe).await {
        // Any response — even a rejection — proves the connection and TLS
        // handshake to the authority succeeded.
        Ok(Ok(_)) | Ok(Err(AuthorityClientError::Rejected { .. })) => CheckStatus::Ok,
        _ => CheckStatus::Error,
    }
}

fn check_certificate(tls: &IngressTlsSettings) -> CheckStatus {
    let Ok(pem) = std::fs::read(&tls.cert_path) else {
        return CheckStatus::Error;
    };
    let mut reader = std::io::BufReader::new(pem.as_slice());
    let Ok(certs) = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>() else {
        return CheckStatus::Error;
    };
    let Some(leaf) = certs.first() else {
        return CheckStatus::Error;
    };
    match x509_parser::parse_x509_certificate(leaf) {
        Ok((_, cert)) if cert.validity().is_valid() => CheckStatus::Ok,
        _ => CheckStatus::Error,
    }
}
