// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Argon2id password hashing and verification (§4.1). Satisfies the data
//! model's "bcrypt-class, cost >= 12" requirement with a memory-hard scheme.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Maps the configured `crypto.password_cost` (a bcrypt-style cost factor)
/// onto Argon2's memory/time parameters. Cost is clamped to >= 12 so a
/// misconfigured low value never weakens the scheme below the spec floor.
#[derive(Clone, Copy, Debug)]
pub struct PasswordCost(u32);

impl PasswordCost {
    pub fn new(cost: u32) -> Self {
        Self(cost.max(12))
    }

    fn m_cost_kib(&self) -> u32 {
        // Cost 12 -> 19 MiB, doubling every 4 steps up to a sane ceiling.
        let doublings = (self.0.saturating_sub(12)) / 4;
        (19_456u32 << doublings.min(6)).min(262_144)
    }

    fn t_cost(&self) -> u32 {
        2
    }
}

fn hasher_for(cost: PasswordCost) -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(cost.m_cost_kib(), cost.t_cost(), 1, None)
        .map_err(|err| PasswordError::Hash(err.to_string()))?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `password` into a self-describing PHC string (algorithm, params
/// and salt are all embedded, so [`verify_password`] needs no side channel).
pub fn hash_password(password: &str, cost: PasswordCost) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = hasher_for(cost)?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| PasswordError::Hash(err.to_string()))?;
    Ok(hash.to_string())
}

/// Verifies `password` against a PHC hash produced by [`hash_password`].
/// Never reconstructs the password; returns `false` on any mismatch,
/// including a malformed hash read back from the store.
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|err| PasswordError::MalformedHash(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_correct_password() {
        let hash = hash_password("correct horse battery staple", PasswordCost::new(12)).unwrap();
        assert!(verify_password(&hash, "correct horse battery staple").unwrap());
    }

    #[test]
    fn rejects_wrong_password() {
        let hash = hash_password("correct horse battery staple", PasswordCost::new(12)).unwrap();
        assert!(!verify_password(&hash, "wrong password").unwrap());
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let hash = hash_password("super-secret", PasswordCost::new(12)).unwrap();
        assert!(!hash.contains("super-secret"));
    }

    #[test]
    fn low_cost_is_clamped_to_floor() {
        let cost = PasswordCost::new(1);
        assert!(cost.m_cost_kib() >= PasswordCost::new(12).m_cost_kib());
    }
}
