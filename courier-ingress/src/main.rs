// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ingress gate (C6) binary: mTLS terminator, payload validation, per-client
//! rate limiting, then register-and-enqueue. Ground: `server/src/main.rs`
//! (retry-connect-to-postgres, config-then-serve sequencing).

mod authority_client;
mod endpoints;
mod error;
mod extract;
mod queue_sink;
mod settings;
mod state;
mod validation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use courier_queue::{
    rate_limiter::{provider::RLPostgresStorage, RLConfig, RateLimiter},
    DurableQueue,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use settings::IngressSettings;
use tracing::info;

use authority_client::AuthorityClient;
use state::AppState;

#[derive(Debug, Parser)]
struct Args {
    /// Overrides the directory `configuration/base.yaml` is read from
    /// (defaults to this crate's own directory).
    #[arg(long, default_value = "courier-ingress")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings: IngressSettings = courier_common::config::load(&args.config_dir, "COURIER")?;

    let _log_guard = courier_common::telemetry::init_from_config(
        "courier-ingress",
        &settings.log.level,
        settings.log.path.as_deref(),
    );

    let queue_pool = connect_with_retry(&settings.queue_database.connection_string()).await?;
    let queue = DurableQueue::new(queue_pool.clone());
    queue.run_migrations().await?;

    let rate_limit_config = RLConfig {
        max_requests: settings.rate_limit.max_requests,
        time_window: chrono::TimeDelta::seconds(settings.rate_limit.window_s as i64),
    };
    let rate_limiter = Arc::new(RateLimiter::new(
        rate_limit_config,
        RLPostgresStorage::new(queue_pool),
    ));

    let authority = Arc::new(AuthorityClient::new(
        &settings.authority,
        Duration::from_secs(settings.request_timeout_s),
        Duration::from_secs(settings.fingerprint_cache_ttl_s),
    )?);

    let app_state = AppState {
        queue: Arc::new(queue),
        rate_limiter,
        authority,
        started_at: std::time::Instant::now(),
    };

    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let listen_addr: SocketAddr = settings.listen.parse()?;
    let tls_config = courier_common::mtls::server_config(
        &settings.tls.cert_path,
        &settings.tls.key_path,
        &settings.tls.client_ca_path,
    )?;

    let app = build_router(app_state, Arc::new(settings.tls.clone()), prometheus_handle);

    info!(%listen_addr, "starting ingress gate");
    courier_common::mtls::serve_mtls(listen_addr, tls_config, app).await?;

    Ok(())
}

async fn connect_with_retry(connection_string: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    let mut attempts = 0;
    loop {
        match sqlx::PgPool::connect(connection_string).await {
            Ok(pool) => return Ok(pool),
            Err(err) => {
                attempts += 1;
                if attempts > 10 {
                    return Err(err);
                }
                info!("failed to connect to postgres, retrying: {err}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn build_router(
    state: AppState,
    tls_settings: Arc<settings::IngressTlsSettings>,
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Router {
    let api = Router::new()
        .route("/api/v1/messages", post(endpoints::submit_message::submit_message))
        .route("/api/v1/health", get(endpoints::health::health))
        .layer(Extension(tls_settings))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let metrics = Router::new()
        .route("/metrics", get(endpoints::metrics::metrics))
        .with_state(prometheus_handle);

    api.merge(metrics)
}
