//! Mapping between database rows and queue types.

use chairline_queue::{
    ActorRef, BookingChannel, Contact, CustomerId, DeliveryOutcome, HistoryEntry,
    NotificationRecord, Provider, ProviderId, ProviderStatus, QueueError, QueueNumber,
    ReminderKind, Result, Role, ServiceId, ServiceOffering, TenantId, Ticket, TicketId,
    TicketStatus,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

/// Columns selected for every ticket query, in [`ticket_from_row`] order.
macro_rules! ticket_columns {
    () => {
        "id, tenant_id, provider_id, service_id, customer_id, contact_name, contact_phone, \
         channel, status, queue_number, service_day, position, estimated_duration_minutes, \
         requested_time, estimated_start, estimated_end, actual_start, actual_end, \
         cancellation_reason, version, created_at, updated_at"
    };
}
pub(crate) use ticket_columns;

/// Statuses that keep a ticket in its queue, as a SQL list.
macro_rules! active_statuses {
    () => {
        "('BOOKED', 'CHECKED_IN', 'IN_SERVICE')"
    };
}
pub(crate) use active_statuses;

pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> QueueError {
    move |e| QueueError::Storage(format!("{context}: {e}"))
}

/// Unique violations mean another writer got there first.
pub(crate) fn write_error(entity: &'static str, id: impl ToString) -> impl FnOnce(sqlx::Error) -> QueueError {
    move |e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => QueueError::conflict(entity, id),
        _ => QueueError::Storage(format!("Failed to write {entity}: {e}")),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| QueueError::Storage(format!("Failed to read column {name}: {e}")))
}

fn corrupt(column: &str, value: &str) -> QueueError {
    QueueError::Storage(format!("Invalid {column} value: {value}"))
}

pub(crate) fn to_db_int(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| QueueError::Storage(format!("Value out of range: {value}")))
}

fn from_db_int(column: &str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| corrupt(column, &value.to_string()))
}

pub(crate) fn ticket_from_row(row: &PgRow) -> Result<Ticket> {
    let channel: String = column(row, "channel")?;
    let status: String = column(row, "status")?;
    let customer_id: Option<Uuid> = column(row, "customer_id")?;

    Ok(Ticket {
        id: TicketId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        provider_id: ProviderId::from_uuid(column(row, "provider_id")?),
        service_id: ServiceId::from_uuid(column(row, "service_id")?),
        customer_id: customer_id.map(CustomerId::from_uuid),
        contact: Contact {
            name: column(row, "contact_name")?,
            phone: column(row, "contact_phone")?,
        },
        channel: BookingChannel::parse(&channel).ok_or_else(|| corrupt("channel", &channel))?,
        status: status.parse::<TicketStatus>().map_err(|_| corrupt("status", &status))?,
        queue_number: QueueNumber::from_label(column(row, "queue_number")?),
        service_day: column(row, "service_day")?,
        position: from_db_int("position", column(row, "position")?)?,
        estimated_duration_minutes: from_db_int(
            "estimated_duration_minutes",
            column(row, "estimated_duration_minutes")?,
        )?,
        requested_time: column(row, "requested_time")?,
        estimated_start: column(row, "estimated_start")?,
        estimated_end: column(row, "estimated_end")?,
        actual_start: column(row, "actual_start")?,
        actual_end: column(row, "actual_end")?,
        cancellation_reason: column(row, "cancellation_reason")?,
        version: column(row, "version")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn provider_from_row(row: &PgRow) -> Result<Provider> {
    let status: String = column(row, "status")?;
    Ok(Provider {
        id: ProviderId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        display_name: column(row, "display_name")?,
        status: ProviderStatus::parse(&status).ok_or_else(|| corrupt("provider status", &status))?,
        version: column(row, "version")?,
    })
}

pub(crate) fn service_from_row(row: &PgRow) -> Result<ServiceOffering> {
    Ok(ServiceOffering {
        id: ServiceId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        name: column(row, "name")?,
        duration_minutes: from_db_int("duration_minutes", column(row, "duration_minutes")?)?,
    })
}

pub(crate) fn history_from_row(row: &PgRow) -> Result<HistoryEntry> {
    let status: String = column(row, "status")?;
    let role: String = column(row, "actor_role")?;
    Ok(HistoryEntry {
        ticket_id: TicketId::from_uuid(column(row, "ticket_id")?),
        status: status.parse::<TicketStatus>().map_err(|_| corrupt("status", &status))?,
        actor: ActorRef {
            role: Role::parse(&role).ok_or_else(|| corrupt("actor_role", &role))?,
            id: column(row, "actor_id")?,
        },
        note: column(row, "note")?,
        recorded_at: column(row, "recorded_at")?,
    })
}

pub(crate) fn notification_from_row(row: &PgRow) -> Result<NotificationRecord> {
    let kind: String = column(row, "kind")?;
    let outcome: String = column(row, "outcome")?;
    Ok(NotificationRecord {
        ticket_id: TicketId::from_uuid(column(row, "ticket_id")?),
        kind: ReminderKind::parse(&kind).ok_or_else(|| corrupt("kind", &kind))?,
        recipient: column(row, "recipient")?,
        body: column(row, "body")?,
        outcome: DeliveryOutcome::parse(&outcome).ok_or_else(|| corrupt("outcome", &outcome))?,
        error: column(row, "error")?,
        recorded_at: column(row, "recorded_at")?,
    })
}
