// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authority API (C4) binary: mTLS internal realm + bearer portal realm over
//! the authority store (C3) and CA service (C2). Ground: `server/src/main.rs`
//! (retry-connect-to-postgres loop, config-then-serve sequencing) and
//! `tonic-server/src/main.rs` (clap `Args`).

mod endpoints;
mod error;
mod extract;
mod state;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use courier_authority::{ca::CaService, AuthorityStore, AuthoritySettings};
use courier_common::crypto::{ear::BodyKey, jwt::JwtSecret, password::PasswordCost, sender_hash::SenderSalt};
use courier_queue::DurableQueue;
use tokio_util::sync::CancellationToken;
use tracing::info;

use axum::{
    routing::{get, post, put},
    Router,
};
use state::{AppState, CryptoContext};

#[derive(Debug, Parser)]
struct Args {
    /// Overrides the directory `configuration/base.yaml` is read from
    /// (defaults to this crate's own directory).
    #[arg(long, default_value = "courier-authority-server")]
    config_dir: String,

    /// Generates a fresh self-signed CA root and exits, writing
    /// `ca.root_cert`/`ca.root_key` PEM files to the given path prefix.
    /// For first-time setup only — never used in steady-state operation.
    #[arg(long)]
    bootstrap_ca: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(prefix) = args.bootstrap_ca {
        let (cert_pem, key_pem) = CaService::bootstrap_root()?;
        std::fs::write(format!("{prefix}.crt"), cert_pem)?;
        std::fs::write(format!("{prefix}.key"), key_pem)?;
        println!("wrote {prefix}.crt and {prefix}.key");
        return Ok(());
    }

    let settings: AuthoritySettings = courier_common::config::load(&args.config_dir, "COURIER")?;

    let _log_guard = courier_common::telemetry::init_from_config(
        "courier-authority-server",
        &settings.log.level,
        settings.log.path.as_deref(),
    );

    let store = connect_with_retry(&settings.database.connection_string()).await;
    store.run_migrations().await?;

    let queue_pool = sqlx::PgPool::connect(&settings.queue_database.connection_string()).await?;
    let queue = DurableQueue::new(queue_pool);
    queue.run_migrations().await?;

    let ca = CaService::from_pem(
        std::fs::read_to_string(&settings.ca.root_cert)?,
        std::fs::read_to_string(&settings.ca.root_key)?,
        settings.ca.client_validity_days,
        Duration::from_secs(settings.crl_cache_ttl_s),
    )?;

    let body_key_bytes = courier_common::crypto::load_fixed_length_secret(
        &settings.crypto.body_key_path,
        courier_common::crypto::ear::AEAD_KEY_SIZE,
    )?;
    let body_key = BodyKey::from_bytes(body_key_bytes.as_slice().try_into().expect("checked length above"));
    let jwt_secret = JwtSecret::from_bytes(std::fs::read(&settings.crypto.jwt_secret)?);

    let crypto = Arc::new(CryptoContext {
        body_key,
        sender_salt: SenderSalt::new(settings.crypto.sender_salt.clone()),
        jwt_secret,
        password_cost: PasswordCost::new(settings.crypto.password_cost),
    });

    let app_state = AppState {
        store: store.clone(),
        queue: queue.clone(),
        ca: Arc::new(ca),
        crypto,
    };

    let shutdown = CancellationToken::new();
    let _sweep_handle = courier_authority::reconciliation::spawn(
        store,
        queue,
        Duration::from_secs(settings.reconciliation_interval_s),
        chrono::Duration::seconds(settings.reconciliation_grace_s as i64),
        shutdown.clone(),
    );

    let internal_addr: SocketAddr = settings.internal_listen.parse()?;
    let portal_addr: SocketAddr = settings.portal_listen.parse()?;

    let internal_tls = courier_common::mtls::server_config(
        &settings.internal_tls.cert_path,
        &settings.internal_tls.key_path,
        &settings.internal_tls.client_ca_path,
    )?;
    let portal_tls = courier_common::mtls::portal_server_config(
        &settings.internal_tls.cert_path,
        &settings.internal_tls.key_path,
    )?;

    let internal_app = internal_router(app_state.clone());
    let portal_app = portal_router(app_state);

    info!(%internal_addr, %portal_addr, "starting authority API");

    let internal_server = courier_common::mtls::serve_mtls(internal_addr, internal_tls, internal_app);
    let portal_server = courier_common::mtls::serve_tls(portal_addr, portal_tls, portal_app);

    tokio::select! {
        result = internal_server => result?,
        result = portal_server => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    Ok(())
}

/// Retries the initial connection for up to ten seconds in case Postgres is
/// still coming up (ground: `server/src/main.rs`'s identical retry loop).
async fn connect_with_retry(connection_string: &str) -> AuthorityStore {
    let mut attempts = 0;
    loop {
        match AuthorityStore::connect(connection_string).await {
            Ok(store) => return store,
            Err(err) => {
                attempts += 1;
                if attempts > 10 {
                    panic!("database not ready after 10 attempts: {err}");
                }
                info!("failed to connect to postgres, retrying: {err}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn internal_router(state: AppState) -> Router {
    Router::new()
        .route("/internal/messages/register", post(endpoints::internal::register_message))
        .route("/internal/messages/deliver", post(endpoints::internal::deliver_message))
        .route("/internal/messages/:id/status", put(endpoints::internal::update_status))
        .route("/internal/clients/lookup", get(endpoints::internal::lookup_client))
        .route("/admin/certificates/generate", post(endpoints::internal::generate_certificate))
        .route("/admin/certificates/revoke", post(endpoints::internal::revoke_certificate))
        .route("/admin/certificates", get(endpoints::internal::list_certificates))
        .route("/admin/stats", get(endpoints::internal::admin_stats))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn portal_router(state: AppState) -> Router {
    Router::new()
        .route("/portal/auth/login", post(endpoints::portal::login))
        .route("/portal/auth/refresh", post(endpoints::portal::refresh))
        .route("/portal/messages", get(endpoints::portal::list_messages))
        .route("/portal/messages/:id", get(endpoints::portal::get_message))
        .route("/portal/profile", get(endpoints::portal::profile))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
