//! User-store contract consumed by the login core.
//!
//! The credential store is external: this core reads users and registered
//! credentials, and its only write is consuming a spent backup code.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::User;
use crate::webauthn::StoredPasskey;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Registered WebAuthn credentials for a user, possibly empty.
    async fn passkeys(&self, user_id: Uuid) -> Result<Vec<StoredPasskey>>;
    /// Hashes of the user's remaining single-use backup codes.
    async fn backup_code_hashes(&self, user_id: Uuid) -> Result<Vec<String>>;
    /// Remove a spent backup code. Returns whether this call removed it;
    /// under concurrent consumers only the first returns `true`.
    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    passkeys: Mutex<HashMap<Uuid, Vec<StoredPasskey>>>,
    backup_codes: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl MemoryUserStore {
    pub async fn add_user(&self, user: User) {
        self.users.lock().await.push(user);
    }

    pub async fn add_passkey(&self, passkey: StoredPasskey) {
        self.passkeys
            .lock()
            .await
            .entry(passkey.user_id)
            .or_default()
            .push(passkey);
    }

    pub async fn add_backup_codes(&self, user_id: Uuid, code_hashes: Vec<String>) {
        self.backup_codes
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .extend(code_hashes);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn passkeys(&self, user_id: Uuid) -> Result<Vec<StoredPasskey>> {
        let passkeys = self.passkeys.lock().await;
        Ok(passkeys.get(&user_id).cloned().unwrap_or_default())
    }

    async fn backup_code_hashes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let codes = self.backup_codes.lock().await;
        Ok(codes.get(&user_id).cloned().unwrap_or_default())
    }

    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool> {
        let mut codes = self.backup_codes.lock().await;
        let Some(hashes) = codes.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = hashes.len();
        hashes.retain(|hash| hash != code_hash);
        Ok(hashes.len() < before)
    }
}
