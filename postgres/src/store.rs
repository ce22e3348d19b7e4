//! `PostgreSQL` queue store.
//!
//! One [`QueueCommit`] is one transaction:
//!
//! 1. Compare-and-swap the provider row on `version` (the queue lock)
//! 2. Compare-and-swap every updated ticket on `version`
//! 3. Insert new tickets (the `(provider_id, service_day, position)` unique
//!    constraint backs position uniqueness)
//! 4. Append history rows
//!
//! Any version mismatch or unique violation rolls the transaction back and
//! surfaces as [`QueueError::ConcurrentModification`].

use crate::rows::{
    active_statuses, history_from_row, provider_from_row, service_from_row, storage,
    ticket_columns, ticket_from_row, to_db_int, write_error,
};
use chairline_queue::providers::{HistoryLog, TicketRepository};
use chairline_queue::{
    HistoryEntry, Provider, ProviderId, QueueCommit, QueueError, QueueSnapshot, Result,
    ServiceId, ServiceOffering, TenantId, Ticket, TicketId,
};
use chairline_runtime::metrics::{STORE_COMMIT_DURATION, histogram};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;

/// Queue storage backed by a `PostgreSQL` pool.
///
/// # Example
///
/// ```no_run
/// use chairline_postgres::PostgresQueueStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresQueueStore::connect("postgres://localhost/chairline").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(storage("Failed to connect"))?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("Migration failed: {e}")))?;
        tracing::info!("Queue schema migrated");
        Ok(())
    }

    /// Register a provider.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` if the ID exists, `Storage` otherwise.
    pub async fn add_provider(&self, provider: &Provider) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO providers (id, tenant_id, display_name, status, version)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(provider.id.as_uuid())
        .bind(provider.tenant_id.as_uuid())
        .bind(&provider.display_name)
        .bind(provider.status.as_str())
        .bind(provider.version)
        .execute(&self.pool)
        .await
        .map_err(write_error("provider", provider.id))?;
        Ok(())
    }

    /// Register a service offering.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` if the ID exists, `Storage` otherwise.
    pub async fn add_service(&self, service: &ServiceOffering) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO services (id, tenant_id, name, duration_minutes)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(service.id.as_uuid())
        .bind(service.tenant_id.as_uuid())
        .bind(&service.name)
        .bind(to_db_int(service.duration_minutes)?)
        .execute(&self.pool)
        .await
        .map_err(write_error("service", service.id))?;
        Ok(())
    }

    async fn lock_provider(tx: &mut Transaction<'_, Postgres>, commit: &QueueCommit) -> Result<()> {
        let provider = &commit.provider;
        let result = sqlx::query(
            r"
            UPDATE providers
            SET status = $2, version = $3
            WHERE id = $1 AND version = $4
            ",
        )
        .bind(provider.id.as_uuid())
        .bind(provider.status.as_str())
        .bind(provider.version)
        .bind(commit.expected_provider_version())
        .execute(&mut **tx)
        .await
        .map_err(storage("Failed to update provider"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::conflict("provider", provider.id));
        }
        Ok(())
    }

    async fn update_ticket(tx: &mut Transaction<'_, Postgres>, ticket: &Ticket) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE tickets
            SET status = $2,
                estimated_start = $3,
                estimated_end = $4,
                actual_start = $5,
                actual_end = $6,
                cancellation_reason = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1 AND version = $10
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.status.as_str())
        .bind(ticket.estimated_start)
        .bind(ticket.estimated_end)
        .bind(ticket.actual_start)
        .bind(ticket.actual_end)
        .bind(&ticket.cancellation_reason)
        .bind(ticket.version)
        .bind(ticket.updated_at)
        .bind(ticket.version - 1)
        .execute(&mut **tx)
        .await
        .map_err(storage("Failed to update ticket"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::conflict("ticket", ticket.id));
        }
        Ok(())
    }

    async fn insert_ticket(tx: &mut Transaction<'_, Postgres>, ticket: &Ticket) -> Result<()> {
        sqlx::query(concat!(
            "INSERT INTO tickets (",
            ticket_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22)"
        ))
        .bind(ticket.id.as_uuid())
        .bind(ticket.tenant_id.as_uuid())
        .bind(ticket.provider_id.as_uuid())
        .bind(ticket.service_id.as_uuid())
        .bind(ticket.customer_id.map(|id| *id.as_uuid()))
        .bind(&ticket.contact.name)
        .bind(&ticket.contact.phone)
        .bind(ticket.channel.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.queue_number.as_str())
        .bind(ticket.service_day)
        .bind(to_db_int(ticket.position)?)
        .bind(to_db_int(ticket.estimated_duration_minutes)?)
        .bind(ticket.requested_time)
        .bind(ticket.estimated_start)
        .bind(ticket.estimated_end)
        .bind(ticket.actual_start)
        .bind(ticket.actual_end)
        .bind(&ticket.cancellation_reason)
        .bind(ticket.version)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(write_error("ticket", ticket.id))?;
        Ok(())
    }

    async fn append_history(tx: &mut Transaction<'_, Postgres>, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO ticket_history (ticket_id, status, actor_role, actor_id, note, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(entry.ticket_id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.actor.role.as_str())
        .bind(entry.actor.id)
        .bind(&entry.note)
        .bind(entry.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(storage("Failed to append history"))?;
        Ok(())
    }
}

impl TicketRepository for PostgresQueueStore {
    async fn find_ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>> {
        let row = sqlx::query(concat!("SELECT ", ticket_columns!(), " FROM tickets WHERE id = $1"))
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load ticket"))?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn find_provider(&self, provider_id: ProviderId) -> Result<Option<Provider>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, display_name, status, version FROM providers WHERE id = $1",
        )
        .bind(provider_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load provider"))?;
        row.as_ref().map(provider_from_row).transpose()
    }

    async fn find_service(&self, service_id: ServiceId) -> Result<Option<ServiceOffering>> {
        let row = sqlx::query("SELECT id, tenant_id, name, duration_minutes FROM services WHERE id = $1")
            .bind(service_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load service"))?;
        row.as_ref().map(service_from_row).transpose()
    }

    async fn load_queue(&self, provider_id: ProviderId, service_day: NaiveDate) -> Result<QueueSnapshot> {
        let provider = self
            .find_provider(provider_id)
            .await?
            .ok_or_else(|| QueueError::not_found("provider", provider_id))?;

        let rows = sqlx::query(concat!(
            "SELECT ",
            ticket_columns!(),
            " FROM tickets WHERE provider_id = $1 AND service_day = $2 AND status IN ",
            active_statuses!(),
            " ORDER BY position"
        ))
        .bind(provider_id.as_uuid())
        .bind(service_day)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load queue"))?;
        let tickets = rows.iter().map(ticket_from_row).collect::<Result<Vec<_>>>()?;

        let last_position: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) FROM tickets WHERE provider_id = $1 AND service_day = $2",
        )
        .bind(provider_id.as_uuid())
        .bind(service_day)
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to read last position"))?;

        Ok(QueueSnapshot {
            provider,
            service_day,
            tickets,
            last_position: u32::try_from(last_position).unwrap_or(0),
        })
    }

    async fn next_queue_number(&self, tenant_id: TenantId, service_day: NaiveDate) -> Result<u32> {
        let value: i32 = sqlx::query_scalar(
            r"
            INSERT INTO queue_number_counters (tenant_id, service_day, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, service_day)
            DO UPDATE SET last_value = queue_number_counters.last_value + 1
            RETURNING last_value
            ",
        )
        .bind(tenant_id.as_uuid())
        .bind(service_day)
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to allocate queue number"))?;

        u32::try_from(value).map_err(|_| QueueError::Storage(format!("Invalid queue counter: {value}")))
    }

    async fn commit(&self, commit: QueueCommit) -> Result<Vec<Ticket>> {
        let started = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to start transaction"))?;

        // Dropping `tx` on any early return rolls it back.
        Self::lock_provider(&mut tx, &commit).await?;
        for ticket in &commit.updated {
            Self::update_ticket(&mut tx, ticket).await?;
        }
        for ticket in &commit.inserted {
            Self::insert_ticket(&mut tx, ticket).await?;
        }
        for entry in &commit.history {
            Self::append_history(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit transaction"))?;

        histogram!(STORE_COMMIT_DURATION)
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(
            provider_id = %commit.provider.id,
            version = commit.provider.version,
            inserted = commit.inserted.len(),
            updated = commit.updated.len(),
            "Queue commit applied"
        );

        Ok(commit.inserted.into_iter().chain(commit.updated).collect())
    }

    async fn active_tickets(&self, service_days: &[NaiveDate]) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            ticket_columns!(),
            " FROM tickets WHERE service_day = ANY($1) AND status IN ",
            active_statuses!(),
            " ORDER BY provider_id, service_day, position"
        ))
        .bind(service_days.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load active tickets"))?;

        rows.iter().map(ticket_from_row).collect()
    }
}

impl HistoryLog for PostgresQueueStore {
    async fn entries_for(&self, ticket_id: TicketId) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r"
            SELECT ticket_id, status, actor_role, actor_id, note, recorded_at
            FROM ticket_history
            WHERE ticket_id = $1
            ORDER BY id
            ",
        )
        .bind(ticket_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load history"))?;

        rows.iter().map(history_from_row).collect()
    }
}
