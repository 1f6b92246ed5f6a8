//! Salted, iterated SHA-256 password hashes stored as
//! `sha256$<iterations>$<salt hex>$<digest hex>`

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::token::SecurityError;

const SCHEME: &str = "sha256";
const DEFAULT_ITERATIONS: u32 = 10_000;
const SALT_LEN: usize = 16;

fn derive(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize()
        .to_vec();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(&digest)
            .chain_update(salt)
            .finalize()
            .to_vec();
    }
    digest
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password, &salt, DEFAULT_ITERATIONS);
    format!(
        "{}${}${}${}",
        SCHEME,
        DEFAULT_ITERATIONS,
        hex::encode(salt),
        hex::encode(digest)
    )
}

/// Check a password against a stored hash in constant time
pub fn verify_password(password: &str, stored: &str) -> Result<bool, SecurityError> {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return Err(SecurityError::MalformedHash);
    };
    if *scheme != SCHEME {
        return Err(SecurityError::MalformedHash);
    }
    let iterations: u32 = iterations.parse().map_err(|_| SecurityError::MalformedHash)?;
    if iterations == 0 {
        return Err(SecurityError::MalformedHash);
    }
    let salt = hex::decode(salt).map_err(|_| SecurityError::MalformedHash)?;
    let expected = hex::decode(expected).map_err(|_| SecurityError::MalformedHash)?;

    let actual = derive(password, &salt, iterations);
    if actual.len() != expected.len() {
        return Ok(false);
    }
    let diff = actual
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    Ok(diff == 0)
}
