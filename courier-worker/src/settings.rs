// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `WorkerSettings` (§4.9/C9). Ground: `backend/src/settings.rs`'s
//! `DatabaseSettings` shape.

use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct WorkerSettings {
    pub queue_database: DatabaseSettings,
    pub authority: AuthorityClientSettings,
    pub worker: WorkerPoolSettings,
    #[serde(default = "default_metrics_listen")]
    pub metrics_listen: String,
    #[serde(default)]
    pub log: LogSettings,
}

/// `log.level`/`log.path` (§4.9), passed straight to
/// [`courier_common::telemetry::init_from_config`].
#[derive(Deserialize, Clone, Debug)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: default_log_level(), path: None }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `worker.count` / `worker.retry_interval_s` / `worker.max_attempts`
/// (§4.9). `max_attempts` defaults to a finite dead-letter ceiling — the
/// spec's "effectively unbounded" default is rejected at the store layer
/// (`implementers must permit a finite ceiling for dead-lettering").
#[derive(Deserialize, Clone, Debug)]
pub struct WorkerPoolSettings {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_retry_interval_s")]
    pub retry_interval_s: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_pop_timeout_s")]
    pub pop_timeout_s: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.name
        )
    }
}

/// The mTLS client identity and endpoint paths the worker uses to call the
/// authority's internal realm (§4.9 `authority.*`).
#[derive(Deserialize, Clone, Debug)]
pub struct AuthorityClientSettings {
    pub base_url: String,
    pub client_cert_path: String,
    pub client_key_path: String,
    pub ca_cert_path: String,
    #[serde(default = "default_deliver_path")]
    pub deliver_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

fn default_worker_count() -> usize {
    4
}

fn default_retry_interval_s() -> u64 {
    30
}

fn default_max_attempts() -> i32 {
    10
}

fn default_pop_timeout_s() -> u64 {
    5
}

fn default_deliver_path() -> String {
    "/internal/messages/deliver".to_string()
}

fn default_status_path() -> String {
    "/internal/messages".to_string()
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9001".to_string()
}
