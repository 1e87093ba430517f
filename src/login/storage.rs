//! Postgres-backed implementations of the login core's store contracts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::abuse::AbuseGuard;
use super::audit::{AuditCategory, AuditSink};
use super::models::{SessionRecord, User};
use super::session::SessionStore;
use super::store::UserStore;
use crate::webauthn::StoredPasskey;

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, password_hash, two_factor_secret, created_at \
                     FROM users WHERE email = $1";
        sqlx::query_as::<_, User>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up user by email")
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email, password_hash, two_factor_secret, created_at \
                     FROM users WHERE id = $1";
        sqlx::query_as::<_, User>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up user by id")
    }

    async fn passkeys(&self, user_id: Uuid) -> Result<Vec<StoredPasskey>> {
        let query = "SELECT credential_id, user_id, label, passkey_data, created_at, last_used_at \
                     FROM webauthn_credentials WHERE user_id = $1 ORDER BY created_at";
        sqlx::query_as::<_, StoredPasskey>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list webauthn credentials")
    }

    async fn backup_code_hashes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let query = "SELECT code_hash FROM user_backup_codes WHERE user_id = $1";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list backup codes")?;
        rows.iter()
            .map(|row| row.try_get("code_hash").context("missing code_hash column"))
            .collect()
    }

    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool> {
        // rows_affected decides the winner under concurrent consumers.
        let query = "DELETE FROM user_backup_codes WHERE user_id = $1 AND code_hash = $2";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(code_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to consume backup code")?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(
        &self,
        user: &User,
        token_hash: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let query =
            "INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(user.id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = "SELECT s.user_id, u.email, s.expires_at \
                     FROM sessions s JOIN users u ON u.id = s.user_id \
                     WHERE s.token_hash = $1 \
                       AND (s.expires_at IS NULL OR s.expires_at > now())";
        sqlx::query_as::<_, SessionRecord>(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

/// Channel counters with an atomic single-statement increment: concurrent
/// writers cannot lose updates, and a counter outside its window restarts
/// from one.
#[derive(Clone)]
pub struct PgAbuseGuard {
    pool: PgPool,
    threshold: u64,
    window_seconds: u64,
}

impl PgAbuseGuard {
    #[must_use]
    pub fn new(pool: PgPool, threshold: u64, window_seconds: u64) -> Self {
        Self {
            pool,
            threshold,
            window_seconds,
        }
    }

    fn window_cutoff(&self) -> DateTime<Utc> {
        let window = i64::try_from(self.window_seconds).unwrap_or(i64::MAX);
        Utc::now() - Duration::seconds(window)
    }
}

#[async_trait]
impl AbuseGuard for PgAbuseGuard {
    async fn is_blocked(&self, channel: &str) -> Result<bool> {
        let query =
            "SELECT failures FROM abuse_counters WHERE channel = $1 AND window_started_at >= $2";
        let row = sqlx::query(query)
            .bind(channel)
            .bind(self.window_cutoff())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to read abuse counter")?;
        let failures: i64 = match row {
            Some(row) => row.try_get("failures").context("missing failures column")?,
            None => 0,
        };
        Ok(u64::try_from(failures).unwrap_or(0) >= self.threshold)
    }

    async fn count_up(&self, channel: &str) -> Result<()> {
        let query = "INSERT INTO abuse_counters (channel, failures, window_started_at) \
                     VALUES ($1, 1, now()) \
                     ON CONFLICT (channel) DO UPDATE SET \
                       failures = CASE WHEN abuse_counters.window_started_at < $2 \
                                       THEN 1 ELSE abuse_counters.failures + 1 END, \
                       window_started_at = CASE WHEN abuse_counters.window_started_at < $2 \
                                                THEN now() ELSE abuse_counters.window_started_at END";
        sqlx::query(query)
            .bind(channel)
            .bind(self.window_cutoff())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to bump abuse counter")?;
        Ok(())
    }

    async fn reset(&self, channel: &str) -> Result<()> {
        let query = "DELETE FROM abuse_counters WHERE channel = $1";
        sqlx::query(query)
            .bind(channel)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to reset abuse counter")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(
        &self,
        category: AuditCategory,
        user_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let query =
            "INSERT INTO audit_log (category, user_id, metadata) VALUES ($1, $2, $3::jsonb)";
        sqlx::query(query)
            .bind(category.as_str())
            .bind(user_id)
            .bind(metadata.to_string())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to record audit event")?;
        Ok(())
    }
}
