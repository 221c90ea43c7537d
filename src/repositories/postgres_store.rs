use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{
    AttendeeRepository, EventRepository, PriceRepository, TicketRepository, TicketStateUpdate,
    TicketingStore, TransactionRepository, TransactionSettlement,
};
use crate::error::{AppError, Result};
use crate::models::{
    Attendee, EventDay, EventSession, PaymentMethod, PaymentTransaction, Ticket, TicketPrice,
    TicketType,
};

/// PostgreSQL-backed store composed of the per-table repositories.
pub struct PgTicketingStore {
    pool: PgPool,
    events: EventRepository,
    prices: PriceRepository,
    tickets: TicketRepository,
    transactions: TransactionRepository,
    attendees: AttendeeRepository,
}

impl PgTicketingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventRepository::new(pool.clone()),
            prices: PriceRepository::new(pool.clone()),
            tickets: TicketRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            attendees: AttendeeRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn prices(&self) -> &PriceRepository {
        &self.prices
    }
}

#[async_trait]
impl TicketingStore for PgTicketingStore {
    async fn find_day(&self, id: Uuid) -> Result<Option<EventDay>> {
        self.events.find_day(id).await
    }

    async fn find_day_by_date(&self, date: NaiveDate) -> Result<Option<EventDay>> {
        self.events.find_day_by_date(date).await
    }

    async fn find_day_by_name(&self, name: &str) -> Result<Option<EventDay>> {
        self.events.find_day_by_name(name).await
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<EventSession>> {
        self.events.find_session(id).await
    }

    async fn find_sessions_for_day(&self, day_id: Uuid) -> Result<Vec<EventSession>> {
        self.events.find_sessions_for_day(day_id).await
    }

    async fn find_active_price(&self, ticket_type: TicketType, day_id: Uuid) -> Result<Option<TicketPrice>> {
        self.prices.find_active_price(ticket_type, day_id).await
    }

    async fn find_payment_method(&self, id: &str) -> Result<Option<PaymentMethod>> {
        self.prices.find_payment_method(id).await
    }

    async fn ticket_code_exists(&self, code: &str) -> Result<bool> {
        self.tickets.code_exists(code).await
    }

    async fn create_ticket_bundle(
        &self,
        ticket: &Ticket,
        attendees: &[Attendee],
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        TicketRepository::insert(&mut *tx, ticket).await?;
        for attendee in attendees {
            AttendeeRepository::insert(&mut *tx, attendee).await?;
        }
        if let Some(transaction) = transaction {
            TransactionRepository::insert(&mut *tx, transaction).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;

        debug!(
            ticket_code = %ticket.ticket_code,
            attendees = attendees.len(),
            with_transaction = transaction.is_some(),
            "Ticket bundle written"
        );
        Ok(())
    }

    async fn find_ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        self.tickets.find_by_id(id).await
    }

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        self.tickets.find_by_code(code).await
    }

    async fn find_tickets_by_purchaser(&self, phone: &str, name: &str) -> Result<Vec<Ticket>> {
        self.tickets.find_by_purchaser(phone, name).await
    }

    async fn record_payment_outcome(
        &self,
        transaction: &PaymentTransaction,
        ticket_update: Option<TicketStateUpdate>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        TransactionRepository::insert(&mut *tx, transaction).await?;
        if let Some(update) = ticket_update {
            let updated = TicketRepository::update_payment_state(
                &mut *tx,
                update.ticket_id,
                update.status,
                update.payment_status,
            )
            .await?;
            if !updated {
                debug!(ticket_id = %update.ticket_id, "Ticket already left PENDING, state kept");
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        self.transactions.find_by_external_id(external_id).await
    }

    async fn find_transactions_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        self.transactions.find_by_ticket(ticket_id).await
    }

    async fn settle_transaction(
        &self,
        settlement: TransactionSettlement,
        ticket_update: TicketStateUpdate,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let settled = TransactionRepository::settle(
            &mut *tx,
            settlement.transaction_id,
            settlement.status,
            settlement.error_message.as_deref(),
            settlement.verification.as_ref(),
        )
        .await?;

        if !settled {
            tx.rollback().await.map_err(AppError::Database)?;
            return Ok(false);
        }

        TicketRepository::update_payment_state(
            &mut *tx,
            ticket_update.ticket_id,
            ticket_update.status,
            ticket_update.payment_status,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(true)
    }

    async fn find_attendees(&self, ticket_id: Uuid, ticket_type: TicketType) -> Result<Vec<Attendee>> {
        self.attendees.find_by_ticket(ticket_id, ticket_type).await
    }

    async fn mark_ticket_used(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        if !TicketRepository::mark_used(&mut *tx, ticket_id, at).await? {
            tx.rollback().await.map_err(AppError::Database)?;
            return Ok(false);
        }
        AttendeeRepository::mark_students_scanned(&mut *tx, ticket_id, at).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(true)
    }
}
