//! Session issuance: token minting and server-side session records.
//!
//! The raw token is only ever returned to set the cookie; storage sees the
//! SHA-256 hash. "Stay logged in" fixes an absolute expiry (60 days by
//! default); otherwise the record is session-scoped and carries none.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{SessionRecord, User};

/// A freshly minted session. `token` goes to the cookie; `expires_at` is
/// `None` for session-scoped credentials.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server-side session records, keyed by token hash.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(
        &self,
        user: &User,
        token_hash: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>>;
    async fn delete(&self, token_hash: &[u8]) -> Result<()>;
}

pub struct SessionIssuer {
    store: Arc<dyn SessionStore>,
    stay_ttl_seconds: i64,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, stay_ttl_seconds: i64) -> Self {
        Self {
            store,
            stay_ttl_seconds,
        }
    }

    /// Mint a token for `user` and persist its hash.
    pub async fn create(&self, user: &User, stay: bool) -> Result<IssuedSession> {
        let token = generate_session_token()?;
        let expires_at = if stay {
            Some(Utc::now() + Duration::seconds(self.stay_ttl_seconds))
        } else {
            None
        };
        self.store
            .insert(user, &hash_session_token(&token), expires_at)
            .await?;
        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve a presented token into a session record, if still valid.
    pub async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>> {
        self.store.lookup(&hash_session_token(token)).await
    }

    /// Destroy the session behind a presented token.
    pub async fn delete(&self, token: &str) -> Result<()> {
        self.store.delete(&hash_session_token(token)).await
    }
}

/// Create a new session token for the auth cookie.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| anyhow!("failed to generate session token: {e}"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Vec<u8>, StoredSession>>,
}

struct StoredSession {
    user_id: Uuid,
    email: String,
    expires_at: Option<DateTime<Utc>>,
}

impl MemorySessionStore {
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(
        &self,
        user: &User,
        token_hash: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.sessions.lock().await.insert(
            token_hash.to_vec(),
            StoredSession {
                user_id: user.id,
                email: user.email.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(token_hash)
            .filter(|session| {
                session
                    .expires_at
                    .is_none_or(|expires_at| expires_at > Utc::now())
            })
            .map(|session| SessionRecord {
                user_id: session.user_id,
                email: session.email.clone(),
                expires_at: session.expires_at,
            }))
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        self.sessions.lock().await.remove(token_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$unused".to_string(),
            two_factor_secret: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn generated_tokens_are_32_random_bytes() -> Result<()> {
        let token = generate_session_token()?;
        let decoded = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .expect("base64url token");
        assert_eq!(decoded.len(), 32);
        assert_ne!(token, generate_session_token()?);
        Ok(())
    }

    #[test]
    fn token_hash_is_stable() {
        assert_eq!(hash_session_token("token"), hash_session_token("token"));
        assert_ne!(hash_session_token("token"), hash_session_token("other"));
    }

    #[tokio::test]
    async fn session_scoped_tokens_have_no_expiry() -> Result<()> {
        let store = Arc::new(MemorySessionStore::default());
        let issuer = SessionIssuer::new(Arc::clone(&store) as Arc<dyn SessionStore>, 60 * 86_400);

        let issued = issuer.create(&user("a@x.com"), false).await?;
        assert!(issued.expires_at.is_none());

        let record = issuer.lookup(&issued.token).await?.expect("session");
        assert_eq!(record.email, "a@x.com");
        assert!(record.expires_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stay_sessions_expire_in_about_sixty_days() -> Result<()> {
        let store = Arc::new(MemorySessionStore::default());
        let issuer = SessionIssuer::new(Arc::clone(&store) as Arc<dyn SessionStore>, 60 * 86_400);

        let issued = issuer.create(&user("a@x.com"), true).await?;
        let expires_at = issued.expires_at.expect("stay expiry");
        let ttl = expires_at - Utc::now();
        assert!(ttl > Duration::days(59) && ttl <= Duration::days(60));
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() -> Result<()> {
        let store = MemorySessionStore::default();
        let owner = user("a@x.com");
        store
            .insert(&owner, b"hash", Some(Utc::now() - Duration::seconds(1)))
            .await?;
        assert!(store.lookup(b"hash").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_destroys_the_session() -> Result<()> {
        let store = Arc::new(MemorySessionStore::default());
        let issuer = SessionIssuer::new(Arc::clone(&store) as Arc<dyn SessionStore>, 60 * 86_400);

        let issued = issuer.create(&user("a@x.com"), false).await?;
        issuer.delete(&issued.token).await?;
        assert!(issuer.lookup(&issued.token).await?.is_none());
        assert!(store.is_empty().await);
        Ok(())
    }
}
