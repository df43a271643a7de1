// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! CA service (C2, §4.2): issues and revokes client certificates against an
//! in-house root, and validates presented leaf certificates by fingerprint.
//! Ground: `other_examples`' `ClusterCA`/`EnrollmentService` (self-signed
//! root + `signed_by` leaf issuance), CRL cache TTL modeled on
//! `backend/src/rate_limiter/mod.rs`'s `Allowance` reset-on-expiry check.
//!
//! Binding authorization to the certificate fingerprint — not just chain
//! validity — lets revocation take effect as soon as the CRL cache expires,
//! without waiting for clients to refresh anything themselves.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use courier_common::identifiers::{ClientId, ClientStatus};
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::{
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey,
};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    error::AuthorityError,
    store::{
        clients::{ClientFilter, ClientRecord, NewClient},
        AuthorityStore,
    },
};

/// A freshly issued client certificate and its private key. The private key
/// is only ever returned from [`CaService::issue_client`] — it is never
/// persisted by the authority (§6.2 "Private key returned only once").
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    pub client_id: ClientId,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ca_certificate_pem: String,
    pub fingerprint: String,
    pub expires_at: DateTime<Utc>,
}

/// Reason recorded alongside a revocation, for the audit log (§4.2).
#[derive(Clone, Copy, Debug)]
pub enum RevocationReason {
    KeyCompromise,
    CessationOfOperation,
    Superseded,
    AdminRevoked,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::KeyCompromise => "key_compromise",
            RevocationReason::CessationOfOperation => "cessation_of_operation",
            RevocationReason::Superseded => "superseded",
            RevocationReason::AdminRevoked => "admin_revoked",
        }
    }
}

/// The fingerprint cache backing CRL checks. Refreshed from `clients` on a
/// short TTL and invalidated immediately on revocation (§4.2, §5 "the CRL is
/// cached with a short TTL and refreshed on revocation").
struct CrlCache {
    ttl: Duration,
    state: RwLock<Option<(Instant, HashSet<String>)>>,
}

impl CrlCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    async fn invalidate(&self) {
        *self.state.write().await = None;
    }

    /// Returns the revoked-fingerprint set, refreshing from `store` if the
    /// cached copy is stale or absent.
    async fn revoked_fingerprints(&self, store: &AuthorityStore) -> Result<HashSet<String>, AuthorityError> {
        if let Some((fetched_at, set)) = self.state.read().await.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(set.clone());
            }
        }

        let revoked = store
            .list_clients(ClientFilter {
                domain: None,
                status: Some(ClientStatus::Revoked),
            })
            .await?
            .into_iter()
            .map(|client| client.cert_fingerprint)
            .collect::<HashSet<_>>();

        *self.state.write().await = Some((Instant::now(), revoked.clone()));
        Ok(revoked)
    }
}

/// The in-house CA (C2). Holds the root keypair in memory for the lifetime
/// of the process; loaded once at startup from `ca.root_cert`/`ca.root_key`
/// PEM files (never generated at runtime outside the `--bootstrap-ca`
/// tooling path).
pub struct CaService {
    root_cert_pem: String,
    root_key_pem: String,
    client_validity_days: u32,
    crl_cache: CrlCache,
}

impl CaService {
    /// Loads the CA root from PEM. The root is validated by attempting to
    /// reconstruct it from its own parameters and key, failing startup if
    /// either half is malformed.
    pub fn from_pem(
        root_cert_pem: String,
        root_key_pem: String,
        client_validity_days: u32,
        crl_cache_ttl: Duration,
    ) -> Result<Self, AuthorityError> {
        let service = Self {
            root_cert_pem,
            root_key_pem,
            client_validity_days,
            crl_cache: CrlCache::new(crl_cache_ttl),
        };
        service.root_issuer()?;
        Ok(service)
    }

    /// Generates a fresh self-signed root — used only by the
    /// `--bootstrap-ca` CLI path of `courier-authority-server` for
    /// first-time setup, never in steady-state operation.
    pub fn bootstrap_root() -> Result<(String, String), AuthorityError> {
        let key_pair = generate_rsa_keypair()?;

        let mut params = CertificateParams::default();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, "Courier Root CA");
        name.push(DnType::OrganizationName, "Courier");
        params.distinguished_name = name;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|err| AuthorityError::CertificateIssuance(err.to_string()))?;

        Ok((cert.pem(), key_pair.serialize_pem()))
    }

    /// Reconstructs the CA's signing keypair and self-signed certificate
    /// from its stored PEM halves, the way `signed_by` requires both to be
    /// re-derived each time rather than cached across requests (ground:
    /// `ClusterCA::issue_cert` in `other_examples`' enrollment.rs).
    fn root_issuer(&self) -> Result<(KeyPair, Certificate), AuthorityError> {
        let key_pair = KeyPair::from_pem(&self.root_key_pem)
            .map_err(|err| AuthorityError::CertificateIssuance(format!("CA key: {err}")))?;
        let params = CertificateParams::from_ca_cert_pem(&self.root_cert_pem)
            .map_err(|err| AuthorityError::CertificateIssuance(format!("CA certificate: {err}")))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|err| AuthorityError::CertificateIssuance(format!("CA certificate: {err}")))?;
        Ok((key_pair, cert))
    }

    /// `IssueClient` (§4.2): generates a fresh 2048-bit RSA keypair, signs a
    /// leaf certificate with `client_id` as the common name, and persists the
    /// new `clients` row in one step.
    pub async fn issue_client(
        &self,
        store: &AuthorityStore,
        client_id: ClientId,
        domain: String,
    ) -> Result<IssuedCertificate, AuthorityError> {
        let (ca_key, ca_cert) = self.root_issuer()?;
        let leaf_key = generate_rsa_keypair()?;

        let mut params = CertificateParams::new(vec![client_id.as_str().to_string()])
            .map_err(|err| AuthorityError::CertificateIssuance(err.to_string()))?;
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, client_id.as_str());
        name.push(DnType::OrganizationName, "Courier client");
        params.distinguished_name = name;

        let cert = params
            .signed_by(&leaf_key, &ca_cert, &ca_key)
            .map_err(|err| AuthorityError::CertificateIssuance(err.to_string()))?;

        let fingerprint = fingerprint_of_der(cert.der());
        let issued_at = Utc::now();
        let expires_at = issued_at + chrono::Duration::days(self.client_validity_days as i64);

        store
            .insert_client(NewClient {
                client_id: client_id.clone(),
                cert_fingerprint: fingerprint.clone(),
                domain,
                issued_at,
                expires_at,
            })
            .await?;

        info!(client_id = %client_id, %fingerprint, "issued client certificate");

        Ok(IssuedCertificate {
            client_id,
            certificate_pem: cert.pem(),
            private_key_pem: leaf_key.serialize_pem(),
            ca_certificate_pem: self.root_cert_pem.clone(),
            fingerprint,
            expires_at,
        })
    }

    /// `RevokeClient` (§4.2): marks the client revoked and invalidates the
    /// CRL cache so the revocation takes effect on the very next lookup
    /// rather than waiting out the TTL.
    pub async fn revoke_client(
        &self,
        store: &AuthorityStore,
        client_id: &ClientId,
        reason: RevocationReason,
        actor: &str,
    ) -> Result<ClientRecord, AuthorityError> {
        let record = store.revoke_client(client_id).await?;
        self.crl_cache.invalidate().await;
        store
            .append_audit_event(crate::store::audit::AuditEvent {
                actor,
                action: "revoke_client",
                subject_id: client_id.as_str(),
                outcome: reason.as_str(),
            })
            .await?;
        warn!(client_id = %client_id, reason = reason.as_str(), "revoked client certificate");
        Ok(record)
    }

    /// `ValidateClientCert` (§4.2): derives the client from the leaf
    /// certificate's fingerprint, rejecting unknown, revoked or expired
    /// clients. The chain itself is validated by the TLS layer (rustls'
    /// `WebPkiClientVerifier`) before this is ever called — here we only
    /// enforce the fingerprint->client binding and the CRL.
    pub async fn validate_client_cert(
        &self,
        store: &AuthorityStore,
        leaf_der: &[u8],
    ) -> Result<ClientId, AuthorityError> {
        let fingerprint = fingerprint_of_der(leaf_der);
        self.validate_fingerprint(store, &fingerprint).await
    }

    /// Same check as [`Self::validate_client_cert`] but from an
    /// already-normalized fingerprint (ingress's short-TTL cache hands this
    /// in directly to avoid re-parsing the DER on every request).
    pub async fn validate_fingerprint(
        &self,
        store: &AuthorityStore,
        fingerprint: &str,
    ) -> Result<ClientId, AuthorityError> {
        let revoked = self.crl_cache.revoked_fingerprints(store).await?;
        if revoked.contains(fingerprint) {
            return Err(AuthorityError::UnknownOrRevokedFingerprint);
        }

        let record = store
            .get_client_by_fingerprint(fingerprint)
            .await
            .map_err(|_| AuthorityError::UnknownOrRevokedFingerprint)?;

        match record.effective_status() {
            ClientStatus::Active => Ok(record.client_id),
            ClientStatus::Revoked | ClientStatus::Expired => {
                Err(AuthorityError::UnknownOrRevokedFingerprint)
            }
        }
    }

    /// `ListClients` (§4.2).
    pub async fn list_clients(
        &self,
        store: &AuthorityStore,
        filter: ClientFilter,
    ) -> Result<Vec<ClientRecord>, AuthorityError> {
        store.list_clients(filter).await
    }

    /// `ListClients` (§4.2), paged per §6.2's `GET /admin/certificates`.
    pub async fn list_clients_paged(
        &self,
        store: &AuthorityStore,
        filter: ClientFilter,
        paging: crate::store::clients::ClientPaging,
    ) -> Result<Vec<ClientRecord>, AuthorityError> {
        store.list_clients_paged(filter, paging).await
    }

    /// `ListExpiring` (§4.2).
    pub async fn list_expiring(
        &self,
        store: &AuthorityStore,
        days: i64,
    ) -> Result<Vec<ClientRecord>, AuthorityError> {
        store.list_expiring(days).await
    }
}

/// Generates a 2048-bit RSA keypair (§4.2 `IssueClient`) and hands it back as
/// an `rcgen` `KeyPair` by round-tripping through PKCS#8 — `rcgen::KeyPair::generate`
/// only ever produces ECDSA P-256 keys, it has no RSA code path at all.
fn generate_rsa_keypair() -> Result<KeyPair, AuthorityError> {
    let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
        .map_err(|err| AuthorityError::CertificateIssuance(format!("RSA key generation: {err}")))?;
    let pkcs8_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|err| AuthorityError::CertificateIssuance(format!("RSA key encoding: {err}")))?;
    KeyPair::from_pem(&pkcs8_pem)
        .map_err(|err| AuthorityError::CertificateIssuance(format!("RSA keypair: {err}")))
}

/// Normalizes a certificate fingerprint to lowercase hex with no separators
/// (Design Notes §9) — SHA-256 over the certificate's DER encoding.
fn fingerprint_of_der(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CaService {
        let (root_cert_pem, root_key_pem) = CaService::bootstrap_root().unwrap();
        CaService::from_pem(root_cert_pem, root_key_pem, 365, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn bootstrap_root_produces_pem_material() {
        let (cert, key) = CaService::bootstrap_root().unwrap();
        assert!(cert.contains("BEGIN CERTIFICATE"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn fingerprint_is_lowercase_hex_sha256() {
        let fp = fingerprint_of_der(b"arbitrary DER bytes for the test");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn service_loads_from_its_own_bootstrap_material() {
        let _ = service();
    }
}
