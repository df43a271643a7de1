// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic, salted SHA-256 hashing of sender identifiers (§4.1,
//! testable property #3). The salt is deployment-wide and loaded from
//! config (`crypto.sender_salt`), never per-message.

use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct SenderSalt(String);

impl SenderSalt {
    pub fn new(salt: impl Into<String>) -> Self {
        Self(salt.into())
    }

    /// Hex-encoded `SHA256(salt || identifier)`. Deterministic: identical
    /// senders always yield identical digests.
    pub fn hash(&self, sender: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.update(sender.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_sender_yields_same_digest() {
        let salt = SenderSalt::new("deployment-salt");
        assert_eq!(salt.hash("+1234567890"), salt.hash("+1234567890"));
    }

    #[test]
    fn different_senders_yield_different_digests() {
        let salt = SenderSalt::new("deployment-salt");
        assert_ne!(salt.hash("+1234567890"), salt.hash("+1234567891"));
    }

    #[test]
    fn different_salts_yield_different_digests() {
        assert_ne!(
            SenderSalt::new("a").hash("+1234567890"),
            SenderSalt::new("b").hash("+1234567890")
        );
    }

    #[test]
    fn digest_is_lowercase_hex_sha256_length() {
        let digest = SenderSalt::new("salt").hash("+1234567890");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
