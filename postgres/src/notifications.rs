//! Notification log on `PostgreSQL`.
//!
//! The partial unique index on `(ticket_id, kind) WHERE outcome = 'sent'`
//! is what makes a second successful record for the same pair impossible,
//! even across processes. Claims are rows in `notification_claims` that a
//! sender may take over once they are older than the stale cutoff.

use crate::rows::{notification_from_row, storage, write_error};
use crate::store::PostgresQueueStore;
use chairline_queue::providers::{LogFuture, NotificationLog};
use chairline_queue::{NotificationRecord, QueueError, ReminderKind, TicketId};
use chrono::{DateTime, Utc};

impl NotificationLog for PostgresQueueStore {
    fn has_sent(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, bool> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT 1 FROM notification_records
                    WHERE ticket_id = $1 AND kind = $2 AND outcome = 'sent'
                )
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(kind.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(storage("Failed to check notification"))
        })
    }

    fn failed_attempts(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, u32> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(
                r"
                SELECT COUNT(*) FROM notification_records
                WHERE ticket_id = $1 AND kind = $2 AND outcome = 'failed'
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(kind.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(storage("Failed to count notification failures"))?;
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        })
    }

    fn try_claim(
        &self,
        ticket_id: TicketId,
        kind: ReminderKind,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> LogFuture<'_, bool> {
        Box::pin(async move {
            // The conditional upsert only touches a row when the existing
            // claim is stale, so zero affected rows means someone holds it.
            let result = sqlx::query(
                r"
                INSERT INTO notification_claims (ticket_id, kind, claimed_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (ticket_id, kind)
                DO UPDATE SET claimed_at = EXCLUDED.claimed_at
                WHERE notification_claims.claimed_at < $4
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(kind.as_str())
            .bind(now)
            .bind(stale_before)
            .execute(self.pool())
            .await
            .map_err(storage("Failed to claim notification"))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn release_claim(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM notification_claims WHERE ticket_id = $1 AND kind = $2")
                .bind(ticket_id.as_uuid())
                .bind(kind.as_str())
                .execute(self.pool())
                .await
                .map_err(storage("Failed to release notification claim"))?;
            Ok(())
        })
    }

    fn record(&self, record: NotificationRecord) -> LogFuture<'_, ()> {
        Box::pin(async move {
            let inserted = sqlx::query(
                r"
                INSERT INTO notification_records
                    (ticket_id, kind, recipient, body, outcome, error, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(record.ticket_id.as_uuid())
            .bind(record.kind.as_str())
            .bind(&record.recipient)
            .bind(&record.body)
            .bind(record.outcome.as_str())
            .bind(&record.error)
            .bind(record.recorded_at)
            .execute(self.pool())
            .await;

            // The claim is released whether or not the insert won.
            sqlx::query("DELETE FROM notification_claims WHERE ticket_id = $1 AND kind = $2")
                .bind(record.ticket_id.as_uuid())
                .bind(record.kind.as_str())
                .execute(self.pool())
                .await
                .map_err(storage("Failed to release notification claim"))?;

            inserted.map_err(write_error("notification", record.ticket_id))?;
            Ok(())
        })
    }

    fn records_for(&self, ticket_id: TicketId) -> LogFuture<'_, Vec<NotificationRecord>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT ticket_id, kind, recipient, body, outcome, error, recorded_at
                FROM notification_records
                WHERE ticket_id = $1
                ORDER BY id
                ",
            )
            .bind(ticket_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(storage("Failed to load notifications"))?;

            rows.iter()
                .map(notification_from_row)
                .collect::<Result<Vec<_>, QueueError>>()
        })
    }
}
