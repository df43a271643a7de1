// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logging setup shared by every binary. Mirrors the
//! `get_subscriber`/`init_subscriber` split so binaries can silence chatty
//! modules in tests without duplicating the layer wiring.

use tracing::{subscriber::set_global_default, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// Build a subscriber for a process's tracing events from multiple layers.
///
/// `name` tags every emitted log line (the bunyan `name` field); `env_filter`
/// is the default level when `RUST_LOG` is unset.
pub fn get_subscriber<Sink>(
    name: String,
    env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    let formatting_layer = BunyanFormattingLayer::new(name, sink);
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Register a subscriber as the process-wide default.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("failed to bridge `log` records into `tracing`");
    set_global_default(subscriber).expect("failed to install tracing subscriber");
}

/// Initializes logging for a binary from the `log.level`/`log.path` config
/// keys (§4.9). When `path` is set, logs additionally fan out to a rolling
/// file appender; the returned [`WorkerGuard`] must be held for the
/// lifetime of the process or buffered log lines are dropped on exit.
pub fn init_from_config(name: &str, level: &str, path: Option<&str>) -> Option<WorkerGuard> {
    match path {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{name}.log"));
            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = get_subscriber(name.to_string(), level.to_string(), non_blocking);
            init_subscriber(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = get_subscriber(name.to_string(), level.to_string(), std::io::stdout);
            init_subscriber(subscriber);
            None
        }
    }
}
