//! Domain types for the queue engine.
//!
//! Identifiers, tenants and actors, the ticket record, providers and service
//! offerings, and the audit/notification records written alongside them.

use crate::status::TicketStatus;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Business that owns providers, services and tickets
    TenantId
);
define_id!(
    /// Staff member whose chair a queue belongs to
    ProviderId
);
define_id!(
    /// Service offering (haircut, beard trim, ...)
    ServiceId
);
define_id!(
    /// Registered customer
    CustomerId
);
define_id!(
    /// Queue ticket
    TicketId
);

// ============================================================================
// Actors
// ============================================================================

/// Role of whoever issues a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Business owner
    Owner,
    /// Front-desk staff
    Staff,
    /// The provider serving the queue
    Provider,
    /// The customer holding the ticket
    Customer,
    /// Background jobs
    System,
}

impl Role {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Staff => "staff",
            Self::Provider => "provider",
            Self::Customer => "customer",
            Self::System => "system",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Owner,
            Self::Staff,
            Self::Provider,
            Self::Customer,
            Self::System,
        ]
        .into_iter()
        .find(|role| role.as_str() == value)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified caller identity, resolved by the outer layer before any command.
///
/// The engine trusts `tenant_id` and compares it with the tenant of every
/// entity the command touches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Caller's role
    pub role: Role,
    /// Tenant the caller acts for
    pub tenant_id: TenantId,
    /// Caller's own identifier (user, customer or provider), if any
    pub actor_id: Option<Uuid>,
}

impl ActorContext {
    /// Create an actor context.
    #[must_use]
    pub const fn new(role: Role, tenant_id: TenantId, actor_id: Option<Uuid>) -> Self {
        Self {
            role,
            tenant_id,
            actor_id,
        }
    }

    /// Staff member of `tenant_id`.
    #[must_use]
    pub const fn staff(tenant_id: TenantId, user_id: Uuid) -> Self {
        Self::new(Role::Staff, tenant_id, Some(user_id))
    }

    /// Customer of `tenant_id`.
    #[must_use]
    pub const fn customer(tenant_id: TenantId, customer_id: CustomerId) -> Self {
        Self::new(Role::Customer, tenant_id, Some(customer_id.0))
    }

    /// Background job acting for `tenant_id`.
    #[must_use]
    pub const fn system(tenant_id: TenantId) -> Self {
        Self::new(Role::System, tenant_id, None)
    }

    /// Reference stored on history entries.
    #[must_use]
    pub const fn reference(&self) -> ActorRef {
        ActorRef {
            role: self.role,
            id: self.actor_id,
        }
    }
}

/// Who made a change, as recorded in ticket history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    /// Role at the time of the change
    pub role: Role,
    /// Actor identifier, if any
    pub id: Option<Uuid>,
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}:{id}", self.role),
            None => write!(f, "{}", self.role),
        }
    }
}

// ============================================================================
// Providers and services
// ============================================================================

/// Availability of a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    /// Free to take the next customer
    Available,
    /// Serving a customer
    Busy,
    /// Temporarily away
    OnBreak,
    /// Not working
    Offline,
}

impl ProviderStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Busy => "BUSY",
            Self::OnBreak => "ON_BREAK",
            Self::Offline => "OFFLINE",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [Self::Available, Self::Busy, Self::OnBreak, Self::Offline]
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider's row. `version` is the optimistic lock for its whole queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider ID
    pub id: ProviderId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Display name
    pub display_name: String,
    /// Current availability
    pub status: ProviderStatus,
    /// Optimistic-lock version, bumped by every queue commit
    pub version: i64,
}

impl Provider {
    /// A freshly registered, available provider.
    #[must_use]
    pub fn new(tenant_id: TenantId, display_name: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(),
            tenant_id,
            display_name: display_name.into(),
            status: ProviderStatus::Available,
            version: 1,
        }
    }
}

/// A bookable service and its expected length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    /// Service ID
    pub id: ServiceId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Display name
    pub name: String,
    /// Expected duration in minutes
    pub duration_minutes: u32,
}

impl ServiceOffering {
    /// Create a service offering.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            id: ServiceId::new(),
            tenant_id,
            name: name.into(),
            duration_minutes,
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// How a ticket entered the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingChannel {
    /// Booked remotely; starts `BOOKED`
    Online,
    /// Created at the desk; starts `CHECKED_IN`
    WalkIn,
}

impl BookingChannel {
    /// Status a new ticket from this channel starts in.
    #[must_use]
    pub const fn initial_status(self) -> TicketStatus {
        match self {
            Self::Online => TicketStatus::Booked,
            Self::WalkIn => TicketStatus::CheckedIn,
        }
    }

    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::WalkIn => "WALK_IN",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONLINE" => Some(Self::Online),
            "WALK_IN" => Some(Self::WalkIn),
            _ => None,
        }
    }
}

/// Human-facing queue label, e.g. `A007`.
///
/// Unique per tenant and service-day.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueNumber(String);

impl QueueNumber {
    /// Format a sequence number with the tenant's prefix.
    #[must_use]
    pub fn new(prefix: &str, sequence: u32) -> Self {
        Self(format!("{prefix}{sequence:03}"))
    }

    /// Wrap an already formatted label (e.g. read back from storage).
    #[must_use]
    pub const fn from_label(label: String) -> Self {
        Self(label)
    }

    /// The label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to reach the ticket holder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Name used in messages
    pub name: Option<String>,
    /// Messaging address (phone number)
    pub phone: Option<String>,
}

impl Contact {
    /// Contact with a name and phone number.
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            phone: Some(phone.into()),
        }
    }

    /// The address to message, if there is a usable one.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

/// One customer's place in a provider's queue for a service-day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Provider whose queue this is
    pub provider_id: ProviderId,
    /// Requested service
    pub service_id: ServiceId,
    /// Registered customer, if any
    pub customer_id: Option<CustomerId>,
    /// How to reach the holder
    pub contact: Contact,
    /// Entry channel
    pub channel: BookingChannel,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Human-facing label
    pub queue_number: QueueNumber,
    /// Calendar day (UTC) the queue belongs to
    pub service_day: NaiveDate,
    /// Order within the provider's day; 1-based, never reused
    pub position: u32,
    /// Expected service length, copied from the service at creation
    pub estimated_duration_minutes: u32,
    /// Time the customer asked for (online bookings)
    pub requested_time: Option<DateTime<Utc>>,
    /// Current estimated start
    pub estimated_start: Option<DateTime<Utc>>,
    /// Current estimated end
    pub estimated_end: Option<DateTime<Utc>>,
    /// When service actually began
    pub actual_start: Option<DateTime<Utc>>,
    /// When service actually ended
    pub actual_end: Option<DateTime<Utc>>,
    /// Reason given on cancellation
    pub cancellation_reason: Option<String>,
    /// Optimistic-lock version
    pub version: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change time
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Expected service length.
    #[must_use]
    pub fn estimated_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.estimated_duration_minutes))
    }

    /// Set the estimate to `[start, start + duration]`.
    ///
    /// Returns `true` if either bound changed.
    pub fn set_estimate(&mut self, start: DateTime<Utc>) -> bool {
        let end = start + self.estimated_duration();
        let changed = self.estimated_start != Some(start) || self.estimated_end != Some(end);
        self.estimated_start = Some(start);
        self.estimated_end = Some(end);
        changed
    }

    /// Waiting for service (`BOOKED` or `CHECKED_IN`).
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.status.is_waiting()
    }

    /// Not terminal.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Address to message, if any.
    #[must_use]
    pub fn contact_address(&self) -> Option<&str> {
        self.contact.address()
    }
}

// ============================================================================
// History and notifications
// ============================================================================

/// Append-only audit row, one per status change (including creation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Ticket the change applies to
    pub ticket_id: TicketId,
    /// Status entered
    pub status: TicketStatus,
    /// Who made the change
    pub actor: ActorRef,
    /// Free-text note (cancel reason, creation channel, ...)
    pub note: Option<String>,
    /// When the change was made
    pub recorded_at: DateTime<Utc>,
}

/// Kinds of customer messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Sent when a ticket is created
    BookingConfirmed,
    /// About thirty minutes before the estimated start
    ThirtyMinutes,
    /// About fifteen minutes before the estimated start
    FifteenMinutes,
    /// First waiting ticket behind the one in service
    NextInLine,
    /// Service has begun
    YourTurn,
    /// Service is finished
    ThankYou,
}

impl ReminderKind {
    /// Every kind.
    pub const ALL: [Self; 6] = [
        Self::BookingConfirmed,
        Self::ThirtyMinutes,
        Self::FifteenMinutes,
        Self::NextInLine,
        Self::YourTurn,
        Self::ThankYou,
    ];

    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingConfirmed => "booking_confirmed",
            Self::ThirtyMinutes => "t_minus_30",
            Self::FifteenMinutes => "t_minus_15",
            Self::NextInLine => "next_in_line",
            Self::YourTurn => "your_turn",
            Self::ThankYou => "thank_you",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Gateway accepted the message
    Sent,
    /// Gateway rejected it or was unreachable
    Failed,
}

impl DeliveryOutcome {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable log row for one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Ticket the message is about
    pub ticket_id: TicketId,
    /// Message kind
    pub kind: ReminderKind,
    /// Address it was sent to
    pub recipient: String,
    /// Rendered text
    pub body: String,
    /// Attempt outcome
    pub outcome: DeliveryOutcome,
    /// Gateway error, when failed
    pub error: Option<String>,
    /// When the attempt finished
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_number_is_zero_padded() {
        assert_eq!(QueueNumber::new("A", 7).as_str(), "A007");
        assert_eq!(QueueNumber::new("B", 1234).as_str(), "B1234");
    }

    #[test]
    fn blank_phone_is_not_an_address() {
        let contact = Contact {
            name: Some("Sam".into()),
            phone: Some("   ".into()),
        };
        assert_eq!(contact.address(), None);
        assert_eq!(Contact::new("Sam", " +15550100 ").address(), Some("+15550100"));
        assert_eq!(Contact::default().address(), None);
    }

    #[test]
    fn walk_ins_start_checked_in() {
        assert_eq!(BookingChannel::WalkIn.initial_status(), TicketStatus::CheckedIn);
        assert_eq!(BookingChannel::Online.initial_status(), TicketStatus::Booked);
    }

    #[test]
    fn actor_reference_display() {
        let tenant = TenantId::new();
        assert_eq!(ActorContext::system(tenant).reference().to_string(), "system");

        let id = Uuid::new_v4();
        let staff = ActorContext::staff(tenant, id).reference();
        assert_eq!(staff.to_string(), format!("staff:{id}"));
    }

    #[test]
    fn stored_names_parse_back() {
        for kind in ReminderKind::ALL {
            assert_eq!(ReminderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderStatus::parse("ON_BREAK"), Some(ProviderStatus::OnBreak));
        assert_eq!(BookingChannel::parse("WALK_IN"), Some(BookingChannel::WalkIn));
        assert_eq!(DeliveryOutcome::parse("bounced"), None);
    }
}
