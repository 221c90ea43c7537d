pub mod attendee_repository;
pub mod event_repository;
pub mod memory_store;
pub mod postgres_store;
pub mod price_repository;
pub mod ticket_repository;
pub mod transaction_repository;

pub use attendee_repository::AttendeeRepository;
pub use event_repository::EventRepository;
pub use memory_store::MemoryStore;
pub use postgres_store::PgTicketingStore;
pub use price_repository::PriceRepository;
pub use ticket_repository::TicketRepository;
pub use transaction_repository::TransactionRepository;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Attendee, EventDay, EventSession, PaymentMethod, PaymentStatus, PaymentTransaction, Ticket,
    TicketPrice, TicketStatus, TicketType, TransactionStatus,
};

/// Database connection pool type alias.
pub type DbPool = PgPool;

/// Ticket state written together with a payment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketStateUpdate {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub payment_status: PaymentStatus,
}

impl TicketStateUpdate {
    pub fn paid(ticket_id: Uuid) -> Self {
        Self {
            ticket_id,
            status: TicketStatus::Active,
            payment_status: PaymentStatus::Paid,
        }
    }

    pub fn failed(ticket_id: Uuid) -> Self {
        Self {
            ticket_id,
            status: TicketStatus::Failed,
            payment_status: PaymentStatus::Failed,
        }
    }
}

/// Final state requested for a PENDING transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSettlement {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    /// Raw verification payload appended to the transaction metadata.
    pub verification: Option<serde_json::Value>,
}

/// Persistence used by the ticketing services.
///
/// Methods that write more than one row are atomic: either every row is
/// written or none is.
#[async_trait]
pub trait TicketingStore: Send + Sync {
    async fn find_day(&self, id: Uuid) -> Result<Option<EventDay>>;

    async fn find_day_by_date(&self, date: NaiveDate) -> Result<Option<EventDay>>;

    async fn find_day_by_name(&self, name: &str) -> Result<Option<EventDay>>;

    async fn find_session(&self, id: Uuid) -> Result<Option<EventSession>>;

    async fn find_sessions_for_day(&self, day_id: Uuid) -> Result<Vec<EventSession>>;

    /// Day-specific active price first, then a general one.
    async fn find_active_price(&self, ticket_type: TicketType, day_id: Uuid) -> Result<Option<TicketPrice>>;

    async fn find_payment_method(&self, id: &str) -> Result<Option<PaymentMethod>>;

    async fn ticket_code_exists(&self, code: &str) -> Result<bool>;

    /// Writes a ticket, its attendees and an optional initial transaction.
    async fn create_ticket_bundle(
        &self,
        ticket: &Ticket,
        attendees: &[Attendee],
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()>;

    async fn find_ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>>;

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>>;

    /// Same phone, case-insensitive name, oldest first.
    async fn find_tickets_by_purchaser(&self, phone: &str, name: &str) -> Result<Vec<Ticket>>;

    /// Appends a gateway transaction and, if given, moves the ticket out of
    /// PENDING.
    async fn record_payment_outcome(
        &self,
        transaction: &PaymentTransaction,
        ticket_update: Option<TicketStateUpdate>,
    ) -> Result<()>;

    /// Latest transaction for an external id.
    async fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>>;

    async fn find_transactions_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<PaymentTransaction>>;

    /// Settles a PENDING transaction and updates its ticket. Returns false,
    /// writing nothing, if the transaction was no longer PENDING.
    async fn settle_transaction(
        &self,
        settlement: TransactionSettlement,
        ticket_update: TicketStateUpdate,
    ) -> Result<bool>;

    async fn find_attendees(&self, ticket_id: Uuid, ticket_type: TicketType) -> Result<Vec<Attendee>>;

    /// Marks a ticket USED unless it already is, together with its student
    /// attendees. Returns false if the ticket was already USED.
    async fn mark_ticket_used(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool>;
}
