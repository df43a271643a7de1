// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `AuthoritySettings` (§4.9/C9). Ground: `backend/src/settings.rs`'s
//! `DatabaseSettings` shape.

use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct AuthoritySettings {
    pub database: DatabaseSettings,
    pub queue_database: DatabaseSettings,
    pub internal_listen: String,
    pub portal_listen: String,
    pub internal_tls: TlsSettings,
    pub ca: CaSettings,
    pub crypto: CryptoSettings,
    #[serde(default = "default_reconciliation_interval_s")]
    pub reconciliation_interval_s: u64,
    #[serde(default = "default_reconciliation_grace_s")]
    pub reconciliation_grace_s: u64,
    #[serde(default = "default_crl_cache_ttl_s")]
    pub crl_cache_ttl_s: u64,
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

/// TLS material for a mandatory-client-auth listener (§4.4, §6.4). `ca_path`
/// is the trust root used to verify presented client certificates — in
/// production this is the same file as `ca.root_cert`.
#[derive(Deserialize, Clone, Debug)]
pub struct TlsSettings {
    pub cert_path: String,
    pub key_path: String,
    pub client_ca_path: String,
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

#[derive(Deserialize, Clone, Debug)]
pub struct CaSettings {
    pub root_cert: String,
    pub root_key: String,
    #[serde(default = "default_client_validity_days")]
    pub client_validity_days: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CryptoSettings {
    pub body_key_path: String,
    pub sender_salt: String,
    pub jwt_secret: String,
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

fn default_reconciliation_interval_s() -> u64 {
    30
}

fn default_reconciliation_grace_s() -> u64 {
    120
}

fn default_crl_cache_ttl_s() -> u64 {
    5
}

fn default_client_validity_days() -> u32 {
    365
}

fn default_password_cost() -> u32 {
    12
}
