// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `GET /metrics` (§4.6): renders the process's Prometheus text exposition
//! via `metrics-exporter-prometheus`'s recorder handle.

use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

pub async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
