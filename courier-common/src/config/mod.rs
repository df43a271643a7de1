// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A single config loader shared by every binary: YAML base file, an
//! optional environment-specific overlay, then environment variable
//! overrides. This is the one place §4.9's key table is enumerated and
//! validated; missing required keys abort at startup with a [`ConfigError`].

use config::{Config, ConfigError, Environment as EnvSource, File};
use serde::de::DeserializeOwned;

/// The possible runtime environment for a courier process.
pub enum RunEnvironment {
    Local,
    Production,
}

impl RunEnvironment {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .to_lowercase()
            .as_str()
        {
            "production" => Self::Production,
            _ => Self::Local,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunEnvironment::Local => "local",
            RunEnvironment::Production => "production",
        }
    }
}

/// Loads `<directory>/configuration/base.yaml`, layers
/// `<directory>/configuration/{local,production}.yaml` on top, then applies
/// `<env_prefix>_`-prefixed environment variables (`_` as the nesting
/// separator, e.g. `COURIER_INGRESS_LISTEN`).
pub fn load<T: DeserializeOwned>(directory: &str, env_prefix: &str) -> Result<T, ConfigError> {
    let base_path = std::env::current_dir().expect("failed to determine current directory");
    let configuration_directory = base_path.join(directory).join("configuration");
    let environment = RunEnvironment::from_env();

    load_from_sources(
        File::from(configuration_directory.join("base")).required(true),
        File::from(configuration_directory.join(environment.as_str())).required(false),
        env_prefix,
    )
}

/// Test/embedded-config variant: loads from in-memory YAML strings instead
/// of the filesystem.
pub fn load_from_str<T: DeserializeOwned>(
    base: &str,
    environment: &str,
    env_prefix: &str,
) -> Result<T, ConfigError> {
    load_from_sources(
        File::from_str(base, config::FileFormat::Yaml),
        File::from_str(environment, config::FileFormat::Yaml),
        env_prefix,
    )
}

fn load_from_sources<T: DeserializeOwned>(
    base: impl config::Source + Send + Sync + 'static,
    overlay: impl config::Source + Send + Sync + 'static,
    env_prefix: &str,
) -> Result<T, ConfigError> {
    let builder = Config::builder()
        .add_source(base)
        .add_source(overlay)
        .add_source(EnvSource::with_prefix(env_prefix).separator("_"));
    builder.build()?.try_deserialize()
}
