//! Delivery ledger — authoritative state for every delivery attempt and the
//! sole arbiter of idempotency.
//!
//! Keyed by (event identity, recipient, channel). `record_attempt` is the
//! atomic claim: exactly one caller transitions a triple from
//! absent/failed-retryable (or pending past the liveness window) into
//! `pending`; concurrent losers observe the in-flight state and skip. All
//! cross-worker coordination flows through these transitions — nothing else
//! in the pipeline takes locks.
//!
//! Records are never deleted; they are retained for idempotency checks and
//! audit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use herald_common::error::AppError;
use herald_common::types::{ChannelKind, DeliveryStatus, EventId};

/// Identity of one unit of delivery work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub event_id: EventId,
    pub recipient: String,
    pub channel: ChannelKind,
}

impl DeliveryKey {
    pub fn new(event_id: EventId, recipient: impl Into<String>, channel: ChannelKind) -> Self {
        Self {
            event_id,
            recipient: recipient.into(),
            channel,
        }
    }
}

/// Persisted state of one triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub status: DeliveryStatus,
    /// Number of claims taken on this triple so far.
    pub attempts: u32,
    /// Failure detail from the most recent outcome, if any.
    pub detail: Option<String>,
    pub first_attempt_at: DateTime<Utc>,
    pub last_outcome_at: Option<DateTime<Utc>>,
}

/// Result of an attempted claim on a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// This caller owns the attempt; the triple is now `pending`.
    Claimed,
    /// The triple was already delivered — idempotent no-op.
    AlreadyDelivered,
    /// Another attempt owns the triple within the liveness window.
    InFlight,
    /// A previous attempt failed terminally; never retried.
    Terminal,
}

/// Durable keyed store for delivery state.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Atomically claim the triple for one delivery attempt.
    ///
    /// `liveness` bounds how long an existing `pending` entry shields the
    /// triple from reclaim; past that window the previous attempt is
    /// presumed dead (crashed worker) and the claim succeeds.
    async fn record_attempt(
        &self,
        key: &DeliveryKey,
        liveness: Duration,
    ) -> Result<ClaimDecision, AppError>;

    /// Record the outcome of an attempt previously claimed on this triple.
    async fn record_outcome(
        &self,
        key: &DeliveryKey,
        status: DeliveryStatus,
        detail: Option<String>,
    ) -> Result<(), AppError>;

    async fn lookup(&self, key: &DeliveryKey) -> Result<Option<DeliveryRecord>, AppError>;
}

struct MemoryEntry {
    record: DeliveryRecord,
    /// Set while the triple is `pending`; drives the liveness window.
    pending_since: Option<Instant>,
}

/// Mutex-guarded in-memory ledger for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<DeliveryKey, MemoryEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples the ledger has seen (for monitoring/tests).
    pub fn tracked_count(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<DeliveryKey, MemoryEntry>>, AppError>
    {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("delivery ledger mutex poisoned".to_string()))
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn record_attempt(
        &self,
        key: &DeliveryKey,
        liveness: Duration,
    ) -> Result<ClaimDecision, AppError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        let Some(entry) = entries.get_mut(key) else {
            entries.insert(
                key.clone(),
                MemoryEntry {
                    record: DeliveryRecord {
                        status: DeliveryStatus::Pending,
                        attempts: 1,
                        detail: None,
                        first_attempt_at: Utc::now(),
                        last_outcome_at: None,
                    },
                    pending_since: Some(now),
                },
            );
            return Ok(ClaimDecision::Claimed);
        };

        match entry.record.status {
            DeliveryStatus::Delivered => Ok(ClaimDecision::AlreadyDelivered),
            DeliveryStatus::FailedTerminal => Ok(ClaimDecision::Terminal),
            DeliveryStatus::Pending => {
                let live = entry
                    .pending_since
                    .is_some_and(|since| now.duration_since(since) < liveness);
                if live {
                    return Ok(ClaimDecision::InFlight);
                }
                // Previous owner presumed dead — reclaim.
                entry.record.attempts += 1;
                entry.pending_since = Some(now);
                Ok(ClaimDecision::Claimed)
            }
            DeliveryStatus::FailedRetryable => {
                entry.record.status = DeliveryStatus::Pending;
                entry.record.attempts += 1;
                entry.pending_since = Some(now);
                Ok(ClaimDecision::Claimed)
            }
        }
    }

    async fn record_outcome(
        &self,
        key: &DeliveryKey,
        status: DeliveryStatus,
        detail: Option<String>,
    ) -> Result<(), AppError> {
        let mut entries = self.lock()?;
        let Some(entry) = entries.get_mut(key) else {
            return Err(AppError::Internal(format!(
                "outcome recorded for unclaimed triple {}/{}/{}",
                key.event_id, key.recipient, key.channel
            )));
        };

        // A worker presumed dead past the liveness window may still report
        // in after the triple was reclaimed and delivered. A delivered
        // outcome is never rolled back.
        if entry.record.status == DeliveryStatus::Delivered {
            tracing::warn!(
                event_id = %key.event_id,
                recipient = %key.recipient,
                channel = %key.channel,
                late_status = %status,
                "Ignoring late outcome for already delivered triple"
            );
            return Ok(());
        }

        entry.record.status = status;
        entry.record.detail = detail;
        entry.record.last_outcome_at = Some(Utc::now());
        entry.pending_since = None;
        Ok(())
    }

    async fn lookup(&self, key: &DeliveryKey) -> Result<Option<DeliveryRecord>, AppError> {
        let entries = self.lock()?;
        Ok(entries.get(key).map(|entry| entry.record.clone()))
    }
}
