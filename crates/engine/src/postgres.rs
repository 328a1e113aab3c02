//! PostgreSQL-backed delivery ledger.
//!
//! The claim in `record_attempt` is a single `INSERT ... ON CONFLICT DO
//! UPDATE` whose `WHERE` clause only matches reclaimable rows, so exactly
//! one of any number of concurrent callers sees a row affected. Losers
//! re-read the row to classify why the claim was refused.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::DeliveryStatus;

use crate::ledger::{ClaimDecision, DeliveryKey, DeliveryLedger, DeliveryRecord};

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    status: DeliveryStatus,
    attempts: i32,
    detail: Option<String>,
    first_attempt_at: DateTime<Utc>,
    last_outcome_at: Option<DateTime<Utc>>,
}

impl From<DeliveryRow> for DeliveryRecord {
    fn from(row: DeliveryRow) -> Self {
        Self {
            status: row.status,
            attempts: row.attempts.max(0) as u32,
            detail: row.detail,
            first_attempt_at: row.first_attempt_at,
            last_outcome_at: row.last_outcome_at,
        }
    }
}

#[async_trait]
impl DeliveryLedger for PgLedger {
    async fn record_attempt(
        &self,
        key: &DeliveryKey,
        liveness: Duration,
    ) -> Result<ClaimDecision, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO delivery_records
                (event_id, recipient, channel, status, attempts, first_attempt_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 1, NOW(), NOW())
            ON CONFLICT (event_id, recipient, channel) DO UPDATE
            SET status = 'pending',
                attempts = delivery_records.attempts + 1,
                updated_at = NOW()
            WHERE delivery_records.status = 'failed_retryable'
               OR (delivery_records.status = 'pending'
                   AND delivery_records.updated_at < NOW() - make_interval(secs => $4))
            "#,
        )
        .bind(key.event_id.as_str())
        .bind(&key.recipient)
        .bind(key.channel)
        .bind(liveness.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimDecision::Claimed);
        }

        // Claim refused — the existing row explains why.
        let status: (DeliveryStatus,) = sqlx::query_as(
            "SELECT status FROM delivery_records
             WHERE event_id = $1 AND recipient = $2 AND channel = $3",
        )
        .bind(key.event_id.as_str())
        .bind(&key.recipient)
        .bind(key.channel)
        .fetch_one(&self.pool)
        .await?;

        match status.0 {
            DeliveryStatus::Delivered => Ok(ClaimDecision::AlreadyDelivered),
            DeliveryStatus::FailedTerminal => Ok(ClaimDecision::Terminal),
            // A racing caller may already have flipped the row back to
            // failed_retryable; treat it as in flight and let the next
            // dispatch pick it up.
            DeliveryStatus::Pending | DeliveryStatus::FailedRetryable => {
                Ok(ClaimDecision::InFlight)
            }
        }
    }

    async fn record_outcome(
        &self,
        key: &DeliveryKey,
        status: DeliveryStatus,
        detail: Option<String>,
    ) -> Result<(), AppError> {
        // `status <> 'delivered'` shuts out stale workers reporting in
        // after their triple was reclaimed and delivered by someone else.
        let result = sqlx::query(
            "UPDATE delivery_records
             SET status = $4, detail = $5, last_outcome_at = NOW(), updated_at = NOW()
             WHERE event_id = $1 AND recipient = $2 AND channel = $3
               AND status <> 'delivered'",
        )
        .bind(key.event_id.as_str())
        .bind(&key.recipient)
        .bind(key.channel)
        .bind(status)
        .bind(detail)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing: Option<(DeliveryStatus,)> = sqlx::query_as(
                "SELECT status FROM delivery_records
                 WHERE event_id = $1 AND recipient = $2 AND channel = $3",
            )
            .bind(key.event_id.as_str())
            .bind(&key.recipient)
            .bind(key.channel)
            .fetch_optional(&self.pool)
            .await?;

            match existing {
                Some((DeliveryStatus::Delivered,)) => {
                    tracing::warn!(
                        event_id = %key.event_id,
                        recipient = %key.recipient,
                        channel = %key.channel,
                        late_status = %status,
                        "Ignoring late outcome for already delivered triple"
                    );
                }
                _ => {
                    return Err(AppError::Internal(format!(
                        "outcome recorded for unclaimed triple {}/{}/{}",
                        key.event_id, key.recipient, key.channel
                    )));
                }
            }
        }
        Ok(())
    }

    async fn lookup(&self, key: &DeliveryKey) -> Result<Option<DeliveryRecord>, AppError> {
        let row: Option<DeliveryRow> = sqlx::query_as(
            "SELECT status, attempts, detail, first_attempt_at, last_outcome_at
             FROM delivery_records
             WHERE event_id = $1 AND recipient = $2 AND channel = $3",
        )
        .bind(key.event_id.as_str())
        .bind(&key.recipient)
        .bind(key.channel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeliveryRecord::from))
    }
}
