//! Abuse guard: failed-attempt counters per login channel.
//!
//! The guard is consulted before any credential comparison and before user
//! lookup, so a blocked channel never learns whether an email exists.
//! `count_up` runs on every credential-bearing attempt, including attempts
//! that are already blocked; only a fully completed login calls `reset`.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Counter contract shared by all login channels.
///
/// Increments must be atomic under concurrent writers; two simultaneous
/// attempts on the same channel must both be counted.
#[async_trait]
pub trait AbuseGuard: Send + Sync {
    async fn is_blocked(&self, channel: &str) -> Result<bool>;
    async fn count_up(&self, channel: &str) -> Result<()>;
    async fn reset(&self, channel: &str) -> Result<()>;
}

/// In-memory guard for tests and single-process deployments.
#[derive(Debug)]
pub struct MemoryAbuseGuard {
    threshold: u64,
    window: Duration,
    counters: Mutex<HashMap<String, Counter>>,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    failures: u64,
    window_started_at: Instant,
}

impl MemoryAbuseGuard {
    #[must_use]
    pub fn new(threshold: u64, window: Duration) -> Self {
        Self {
            threshold,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Current failure count inside the active window.
    pub async fn failures(&self, channel: &str) -> u64 {
        let counters = self.counters.lock().await;
        counters
            .get(channel)
            .filter(|counter| counter.window_started_at.elapsed() < self.window)
            .map_or(0, |counter| counter.failures)
    }
}

#[async_trait]
impl AbuseGuard for MemoryAbuseGuard {
    async fn is_blocked(&self, channel: &str) -> Result<bool> {
        Ok(self.failures(channel).await >= self.threshold)
    }

    async fn count_up(&self, channel: &str) -> Result<()> {
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(channel.to_string()).or_insert(Counter {
            failures: 0,
            window_started_at: Instant::now(),
        });
        if entry.window_started_at.elapsed() >= self.window {
            entry.failures = 0;
            entry.window_started_at = Instant::now();
        }
        entry.failures += 1;
        Ok(())
    }

    async fn reset(&self, channel: &str) -> Result<()> {
        let mut counters = self.counters.lock().await;
        counters.remove(channel);
        Ok(())
    }
}
