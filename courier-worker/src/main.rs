// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker pool (C7) binary: `worker.count` concurrent loops popping the
//! durable queue and delivering via the authority's mTLS internal realm.
//! Ground: `server/src/main.rs` (retry-connect-to-postgres, config-then-run
//! sequencing).

mod authority_client;
mod settings;
mod worker;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use courier_queue::DurableQueue;
use metrics_exporter_prometheus::PrometheusBuilder;
use settings::WorkerSettings;
use tokio_util::sync::CancellationToken;
use tracing::info;

use authority_client::AuthorityClient;
use worker::WorkerConfig;

#[derive(Debug, Parser)]
struct Args {
    /// Overrides the directory `configuration/base.yaml` is read from
    /// (defaults to this crate's own directory).
    #[arg(long, default_value = "courier-worker")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings: WorkerSettings = courier_common::config::load(&args.config_dir, "COURIER")?;

    let _log_guard = courier_common::telemetry::init_from_config(
        "courier-worker",
        &settings.log.level,
        settings.log.path.as_deref(),
    );

    let queue_pool = connect_with_retry(&settings.queue_database.connection_string()).await?;
    let queue = DurableQueue::new(queue_pool);
    queue.run_migrations().await?;

    let metrics_addr: std::net::SocketAddr = settings.metrics_listen.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;

    let shutdown = CancellationToken::new();
    let config = WorkerConfig {
        pop_timeout: Duration::from_secs(settings.worker.pop_timeout_s),
        retry_interval: Duration::from_secs(settings.worker.retry_interval_s),
        max_attempts: settings.worker.max_attempts,
    };

    let mut handles = Vec::with_capacity(settings.worker.count);
    for index in 0..settings.worker.count {
        let worker_id = format!("worker-{index}");
        let authority = Arc::new(AuthorityClient::new(&settings.authority, Duration::from_secs(10))?);
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        let config = WorkerConfig {
            pop_timeout: config.pop_timeout,
            retry_interval: config.retry_interval,
            max_attempts: config.max_attempts,
        };
        handles.push(tokio::spawn(async move {
            worker::run(worker_id, queue, authority, config, shutdown).await;
        }));
    }

    info!(count = settings.worker.count, %metrics_addr, "worker pool started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    for handle in handles {
        let _ = handle.await;
    }

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
