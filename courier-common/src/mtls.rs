// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared mTLS plumbing for the internal listeners of `courier-ingress` and
//! `courier-authority-server` (§4.4, §4.6, §5 suspension point (a)). Builds
//! the rustls server config with mandatory client-certificate verification
//! and wraps `axum-server`'s accept loop so every handler can pull the
//! caller's verified leaf certificate out of the request extensions before
//! it does anything else.
//!
//! Ground: `agentgateway`'s `caclient.rs` TLS-layering shape, adapted from a
//! gRPC client identity to a server-side accept hook.

use std::{
    fs::File,
    future::Future,
    io::BufReader,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
};

use axum_server::accept::Accept;
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
    RootCertStore, ServerConfig as RustlsServerConfig,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tower_http::add_extension::AddExtension;

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read TLS material at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no PEM certificates found in {0}")]
    NoCertificates(String),
    #[error("no PEM private key found in {0}")]
    NoPrivateKey(String),
    #[error("rustls configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("client verifier configuration rejected: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// The verified caller identity attached to every request on an mTLS
/// listener, derived from the leaf certificate's DER encoding. Handlers pull
/// this out of request extensions rather than re-parsing the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerIdentity {
    pub fingerprint: String,
    pub leaf_der: Vec<u8>,
}

impl PeerIdentity {
    fn from_leaf(der: &CertificateDer<'_>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(der.as_ref());
        Self {
            fingerprint: hex::encode(hasher.finalize()),
            leaf_der: der.as_ref().to_vec(),
        }
    }
}

/// Builds a mandatory-client-auth rustls [`RustlsServerConfig`] from PEM
/// files on disk: the listener's own certificate chain and private key, and
/// a trust root used to verify presented client certificates (normally the
/// in-house CA's root certificate, §4.2).
pub fn server_config(
    cert_path: &str,
    key_path: &str,
    client_ca_path: &str,
) -> Result<RustlsServerConfig, TlsSetupError> {
    let cert_chain = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;
    let mut roots = RootCertStore::empty();
    for cert in read_certs(client_ca_path)? {
        roots
            .add(cert)
            .map_err(|err| TlsSetupError::Rustls(rustls::Error::General(err.to_string())))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots)).build()?;

    let config = RustlsServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;
    Ok(config)
}

fn read_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Io {
        path: path.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsSetupError::Io {
            path: path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn read_private_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Io {
        path: path.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsSetupError::Io {
            path: path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsSetupError::NoPrivateKey(path.to_string()))
}

/// `axum-server` [`Accept`] implementation that terminates TLS with
/// mandatory client-certificate verification and injects the caller's
/// [`PeerIdentity`] into every request's extensions, so handlers extract it
/// with a plain `Extension<PeerIdentity>` before any body parsing happens
/// (§4.6 step 1–2).
#[derive(Clone)]
pub struct MtlsAcceptor {
    inner: tokio_rustls::TlsAcceptor,
}

impl MtlsAcceptor {
    pub fn new(config: RustlsServerConfig) -> Self {
        Self {
            inner: tokio_rustls::TlsAcceptor::from(Arc::new(config)),
        }
    }
}

impl<I, S> Accept<I, S> for MtlsAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = tokio_rustls::server::TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future =
        Pin<Box<dyn Future<Output = std::io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let tls_stream = acceptor.accept(stream).await?;
            let peer_certs = tls_stream
                .get_ref()
                .1
                .peer_certificates()
                .map(<[CertificateDer<'_>]>::to_vec)
                .unwrap_or_default();
            let leaf = peer_certs.first().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "mTLS handshake completed without a client certificate",
                )
            })?;
            let identity = PeerIdentity::from_leaf(leaf);
            Ok((tls_stream, AddExtension::new(service, identity)))
        })
    }
}

/// Runs an axum `Router` behind [`MtlsAcceptor`] on `addr` until the process
/// is asked to shut down. A thin wrapper around `axum_server::bind` so every
/// internal-realm binary configures its listener identically.
pub async fn serve_mtls(
    addr: SocketAddr,
    config: RustlsServerConfig,
    app: axum::Router,
) -> std::io::Result<()> {
    axum_server::bind(addr)
        .acceptor(MtlsAcceptor::new(config))
        .serve(app.into_make_service())
        .await
}

/// Builds a plain (no client-auth) rustls [`RustlsServerConfig`] for the
/// portal realm (§4.4), which authenticates callers via bearer token rather
/// than a client certificate.
pub fn portal_server_config(cert_path: &str, key_path: &str) -> Result<RustlsServerConfig, TlsSetupError> {
    let cert_chain = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;
    let config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(config)
}

/// Runs an axum `Router` behind a plain (no client-auth) TLS listener on
/// `addr`, for the bearer-token-protected portal realm.
pub async fn serve_tls(
    addr: SocketAddr,
    config: RustlsServerConfig,
    app: axum::Router,
) -> std::io::Result<()> {
    axum_server::bind_rustls(addr, axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(config)))
        .serve(app.into_make_service())
        .await
}
