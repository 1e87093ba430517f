//! Short-lived, single-consumer cache for in-flight login challenges.
//!
//! Two kinds of entries live here between request round-trips:
//!
//! 1. Pending two-factor state, created when password verification succeeds
//!    for a user with a second factor. The payload carries the TOTP secret,
//!    so it is sealed (ChaCha20-Poly1305, AAD bound to the entry id) before
//!    it touches the map.
//! 2. Pending WebAuthn authentication state, created when assertion args are
//!    issued. The challenge bytes inside must match byte-for-byte on the
//!    return trip; `webauthn-rs` enforces that during verification.
//!
//! Consumption is compare-and-clear: `take_*` removes the entry under the
//! lock, so exactly one of any number of concurrent consumers obtains the
//! value and a replayed id always misses. Entries expire after a fixed TTL;
//! expired entries are swept on insert and rejected on take.

use anyhow::{anyhow, Context, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;
use webauthn_rs::prelude::PasskeyAuthentication;

/// Pending state between the password step and the two-factor step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    pub user_id: Uuid,
    pub stay: bool,
    pub totp_secret: Option<String>,
    pub backup_code_hashes: Vec<String>,
    pub redirect: String,
}

struct SealedEntry {
    data: Vec<u8>,
    created_at: Instant,
}

struct AssertionEntry {
    state: PasskeyAuthentication,
    created_at: Instant,
}

pub struct ChallengeCache {
    cipher: ChaCha20Poly1305,
    ttl: Duration,
    two_factor: Mutex<HashMap<Uuid, SealedEntry>>,
    assertions: Mutex<HashMap<Uuid, AssertionEntry>>,
}

impl ChallengeCache {
    #[must_use]
    pub fn new(key: [u8; 32], ttl: Duration) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            ttl,
            two_factor: Mutex::new(HashMap::new()),
            assertions: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a fresh sealing key. Entries do not survive a restart, so a
    /// per-process random key is the default when none is configured.
    #[must_use]
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Seal and stash pending two-factor state, returning the entry id the
    /// client round-trips.
    pub async fn stash_two_factor(&self, pending: &PendingTwoFactor) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let plaintext =
            serde_json::to_vec(pending).context("failed to serialize pending two-factor state")?;
        let sealed = self.seal(&two_factor_aad(id), &plaintext)?;
        let mut entries = self.two_factor.lock().await;
        entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        entries.insert(
            id,
            SealedEntry {
                data: sealed,
                created_at: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Consume pending two-factor state. Returns `None` for unknown, expired,
    /// or already-consumed ids.
    pub async fn take_two_factor(&self, id: Uuid) -> Option<PendingTwoFactor> {
        let entry = {
            let mut entries = self.two_factor.lock().await;
            entries.remove(&id)
        }?;
        if entry.created_at.elapsed() >= self.ttl {
            return None;
        }
        match self
            .open(&two_factor_aad(id), &entry.data)
            .and_then(|plaintext| {
                serde_json::from_slice(&plaintext)
                    .context("failed to deserialize pending two-factor state")
            }) {
            Ok(pending) => Some(pending),
            Err(err) => {
                warn!("Discarding undecryptable two-factor challenge: {err}");
                None
            }
        }
    }

    /// Stash WebAuthn authentication state, returning the challenge id.
    pub async fn stash_assertion(&self, state: PasskeyAuthentication) -> Uuid {
        let id = Uuid::new_v4();
        let mut entries = self.assertions.lock().await;
        entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        entries.insert(
            id,
            AssertionEntry {
                state,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Consume WebAuthn authentication state. Single use: the first caller
    /// wins, every later caller (including a replay) misses.
    pub async fn take_assertion(&self, id: Uuid) -> Option<PasskeyAuthentication> {
        let entry = {
            let mut entries = self.assertions.lock().await;
            entries.remove(&id)
        }?;
        if entry.created_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.state)
    }

    #[cfg(test)]
    pub(crate) async fn pending_assertions(&self) -> usize {
        self.assertions.lock().await.len()
    }

    /// Returns `nonce (12 bytes) || ciphertext`.
    fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| anyhow!("challenge seal failure: {e}"))?;

        let mut sealed = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Expects `data` to be `nonce (12 bytes) || ciphertext`.
    fn open(&self, aad: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 12 {
            return Err(anyhow!("invalid sealed challenge length"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|e| anyhow!("challenge open failure: {e}"))
    }
}

fn two_factor_aad(id: Uuid) -> Vec<u8> {
    format!("pending-2fa:v1|{id}").into_bytes()
}
