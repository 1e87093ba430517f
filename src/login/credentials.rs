//! Password verification against stored Argon2id hashes.
//!
//! The verifier never tells its caller whether the failure was "no such
//! user" or "wrong password": when no hash is on file it still runs a full
//! Argon2id verification against a process-local dummy hash, so the two
//! paths have the same shape and cost.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier as _,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};

pub(crate) struct PasswordVerifier {
    dummy_hash: String,
}

impl PasswordVerifier {
    /// Build a verifier with a fresh random dummy hash.
    pub(crate) fn new() -> Result<Self> {
        let mut throwaway = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut throwaway)
            .map_err(|e| anyhow!("failed to generate dummy password: {e}"))?;
        let dummy_hash = hash_password(&URL_SAFE_NO_PAD.encode(throwaway))?;
        Ok(Self { dummy_hash })
    }

    /// Verify a presented password. `stored` is `None` when no user was
    /// found; the dummy hash is verified instead and the result forced false.
    pub(crate) fn verify(&self, stored: Option<&str>, presented: &str) -> bool {
        let hash = stored.unwrap_or(&self.dummy_hash);
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        let matched = Argon2::default()
            .verify_password(presented.as_bytes(), &parsed)
            .is_ok();
        matched && stored.is_some()
    }
}

/// Hash a password as an Argon2id PHC string. Used by provisioning tooling
/// and test fixtures; the login core itself only verifies.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}
