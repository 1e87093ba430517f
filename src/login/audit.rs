//! Append-only audit events for completed login attempts.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Event categories recorded by the login core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    LoginSuccess,
    LoginFailed,
}

impl AuditCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
        }
    }
}

/// Sink for audit events. Records are written once per completed attempt and
/// never mutated or deleted by this core.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        category: AuditCategory,
        user_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub category: AuditCategory,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

/// In-memory sink for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub async fn recorded(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(
        &self,
        category: AuditCategory,
        user_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.events.lock().await.push(AuditEvent {
            category,
            user_id,
            metadata,
        });
        Ok(())
    }
}
