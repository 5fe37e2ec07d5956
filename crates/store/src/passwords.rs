//! Salted credential hashing for login checks.
//!
//! The credential blob stored in a role row is `salt || SHA-256(salt ||
//! password)` with a 16-byte salt. Only the blob is replicated; hashing and
//! verification happen on the node handling the login. This is a simple
//! salted digest, not a tunable password-hashing scheme.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// Digest length in bytes.
const DIGEST_SIZE: usize = 32;

/// Hashes a password under a fresh salt, returning the credential blob.
#[must_use]
pub fn hash_password(password: &str) -> Vec<u8> {
    hash_with_salt(password, &generate_salt(password))
}

/// Hashes a password under a given salt.
#[must_use]
pub fn hash_with_salt(password: &str, salt: &[u8; SALT_SIZE]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut blob = Vec::with_capacity(SALT_SIZE + DIGEST_SIZE);
    blob.extend_from_slice(salt);
    blob.extend_from_slice(&digest);
    blob
}

/// Verifies a password against a stored credential blob.
///
/// Returns `false` for malformed blobs; the caller surfaces a uniform
/// authentication failure either way.
#[must_use]
pub fn verify_password(password: &str, blob: &[u8]) -> bool {
    if blob.len() != SALT_SIZE + DIGEST_SIZE {
        return false;
    }
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&blob[..SALT_SIZE]);
    let expected = hash_with_salt(password, &salt);

    // Constant-time comparison over the fixed-length blob.
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(blob.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Derives a salt from the wall clock and the password bytes. Salts need
/// uniqueness, not secrecy.
fn generate_salt(password: &str) -> [u8; SALT_SIZE] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&digest[..SALT_SIZE]);
    salt
}
