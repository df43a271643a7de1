// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crypto service (§4.1): body encryption-at-rest, sender hashing, password
//! hashing and JWT mint/verify. Every primitive here fails closed: a bad key
//! file or a corrupt ciphertext is a typed error, never silently coalesced
//! with "not found".

pub mod ear;
pub mod jwt;
pub mod password;
pub mod sender_hash;

use std::{fs, os::unix::fs::PermissionsExt, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path} has group/world-readable permissions; refusing to start")]
    InsecurePermissions { path: String },
    #[error("key file {path} has unexpected length {actual}, expected {expected}")]
    WrongLength {
        path: String,
        expected: usize,
        actual: usize,
    },
}

/// Reads a fixed-length raw-bytes secret from disk, aborting if the file is
/// readable by anyone other than the owner. Used for the AES body key and
/// the JWT HMAC secret (§6.4).
pub fn load_fixed_length_secret(path: impl AsRef<Path>, expected_len: usize) -> Result<Vec<u8>, KeyLoadError> {
    let path_ref = path.as_ref();
    let path_str = path_ref.display().to_string();

    let metadata = fs::metadata(path_ref).map_err(|source| KeyLoadError::Io {
        path: path_str.clone(),
        source,
    })?;
    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(KeyLoadError::InsecurePermissions { path: path_str });
    }

    let bytes = fs::read(path_ref).map_err(|source| KeyLoadError::Io {
        path: path_str.clone(),
        source,
    })?;
    if bytes.len() != expected_len {
        return Err(KeyLoadError::WrongLength {
            path: path_str,
            expected: expected_len,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}
