// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Encryption-at-rest (EAR) for message bodies: AES-256-GCM with a random
//! 96-bit nonce per message. The key is loaded once at process startup from
//! a restricted-permission file (`crypto.body_key_path`).

use aes_gcm::{
    aead::{Aead as _, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AEAD_KEY_SIZE: usize = 32;
const AEAD_NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("AEAD encryption failure")]
    Seal,
}

/// Decryption failure is its own typed error — never coalesced with
/// "not found" (§4.1 failure mode).
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("invalid ciphertext: authentication failed or malformed nonce")]
    InvalidCiphertext,
}

/// Ciphertext plus the nonce it was sealed with. Stored as two columns
/// (`body_ciphertext`, `body_nonce`) rather than concatenated, mirroring the
/// teacher's `AeadCiphertext { ciphertext, nonce }` split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; AEAD_NONCE_SIZE],
}

/// Holds the AES-256 key in memory for the lifetime of the process.
#[derive(Clone)]
pub struct BodyKey {
    cipher: Aes256Gcm,
}

impl BodyKey {
    pub fn from_bytes(key_bytes: &[u8; AEAD_KEY_SIZE]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Ciphertext, EncryptionError> {
        let mut nonce_bytes = [0u8; AEAD_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::Seal)?;
        Ok(Ciphertext {
            ciphertext,
            nonce: nonce_bytes,
        })
    }

    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, DecryptionError> {
        let nonce = Nonce::from_slice(&ciphertext.nonce);
        self.cipher
            .decrypt(nonce, ciphertext.ciphertext.as_ref())
            .map_err(|_| DecryptionError::InvalidCiphertext)
    }
}

impl Ciphertext {
    /// Packs as `nonce || ciphertext` for transport through a single-column
    /// store (the queue entry's `body_ciphertext`, §3 "Queue entry"). The
    /// authority's own table keeps the two as separate columns; this
    /// repacked form only has to round-trip, never be queried on.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend(self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        if bytes.len() < AEAD_NONCE_SIZE {
            return Err(DecryptionError::InvalidCiphertext);
        }
        let (nonce, ciphertext) = bytes.split_at(AEAD_NONCE_SIZE);
        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            nonce: nonce.try_into().expect("split at AEAD_NONCE_SIZE"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> BodyKey {
        BodyKey::from_bytes(&[7u8; AEAD_KEY_SIZE])
    }

    #[test]
    fn round_trips_plaintext() {
        let key = test_key();
        let ciphertext = key.encrypt(b"hello from a client").unwrap();
        assert_ne!(ciphertext.ciphertext, b"hello from a client");
        let plaintext = key.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello from a client");
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let key = test_key();
        let mut ciphertext = key.encrypt(b"Hello").unwrap();
        let last = ciphertext.ciphertext.len() - 1;
        ciphertext.ciphertext[last] ^= 0xff;
        assert!(matches!(
            key.decrypt(&ciphertext),
            Err(DecryptionError::InvalidCiphertext)
        ));
    }

    #[test]
    fn distinct_nonces_for_identical_plaintext() {
        let key = test_key();
        let a = key.encrypt(b"same").unwrap();
        let b = key.encrypt(b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn packed_bytes_round_trip() {
        let key = test_key();
        let ciphertext = key.encrypt(b"packed for the queue").unwrap();
        let packed = ciphertext.clone().into_bytes();
        let unpacked = Ciphertext::from_bytes(&packed).unwrap();
        assert_eq!(unpacked, ciphertext);
        assert_eq!(key.decrypt(&unpacked).unwrap(), b"packed for the queue");
    }

    #[test]
    fn rejects_packed_bytes_shorter_than_nonce() {
        assert!(matches!(
            Ciphertext::from_bytes(&[1, 2, 3]),
            Err(DecryptionError::InvalidCiphertext)
        ));
    }
}
