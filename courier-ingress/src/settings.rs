// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `IngressSettings` (§4.9/C9). Ground: `backend/src/settings.rs`'s
//! `DatabaseSettings` shape, generalized to the ingress's own key table.

use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct IngressSettings {
    pub listen: String,
    pub tls: IngressTlsSettings,
    pub rate_limit: RateLimitSettings,
    pub queue_database: DatabaseSettings,
    pub authority: AuthorityClientSettings,
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
    #[serde(default = "default_fingerprint_cache_ttl_s")]
    pub fingerprint_cache_ttl_s: u64,
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

/// TLS material for the mandatory-client-auth listener clients connect to
/// (§4.6 step 1).
#[derive(Deserialize, Clone, Debug)]
pub struct IngressTlsSettings {
    pub cert_path: String,
    pub key_path: String,
    pub client_ca_path: String,
}

/// Per-client budget, default 100 requests per 60-second window (§4.8).
#[derive(Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u64,
    #[serde(default = "default_rate_limit_window_s")]
    pub window_s: u64,
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

/// The mTLS client identity and endpoint paths the ingress uses to call the
/// authority's internal realm (§4.9 `authority.*`).
#[derive(Deserialize, Clone, Debug)]
pub struct AuthorityClientSettings {
    pub base_url: String,
    pub client_cert_path: String,
    pub client_key_path: String,
    pub ca_cert_path: String,
    #[serde(default = "default_register_path")]
    pub register_path: String,
    #[serde(default = "default_lookup_path")]
    pub lookup_path: String,
}

fn default_request_timeout_s() -> u64 {
    5
}

fn default_fingerprint_cache_ttl_s() -> u64 {
    5
}

fn default_rate_limit_max() -> u64 {
    100
}

fn default_rate_limit_window_s() -> u64 {
    60
}

fn default_register_path() -> String {
    "/internal/messages/register".to_string()
}

fn default_lookup_path() -> String {
    "/internal/clients/lookup".to_string()
}
