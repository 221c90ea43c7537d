//! In-memory store for local runs and tests.
//!
//! All tables live behind one lock, so every trait method is atomic with
//! respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TicketStateUpdate, TicketingStore, TransactionSettlement};
use crate::error::{AppError, Result};
use crate::models::{
    Attendee, EventDay, EventSession, PaymentMethod, PaymentStatus, PaymentTransaction, Ticket,
    TicketPrice, TicketStatus, TicketType, TransactionStatus,
};

#[derive(Default)]
struct MemoryState {
    days: Vec<EventDay>,
    sessions: Vec<EventSession>,
    prices: Vec<TicketPrice>,
    payment_methods: Vec<PaymentMethod>,
    // Insertion order doubles as creation order.
    tickets: Vec<Ticket>,
    transactions: Vec<PaymentTransaction>,
    attendees: Vec<Attendee>,
}

impl MemoryState {
    fn ticket_mut(&mut self, id: Uuid) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }

    fn apply_payment_state(&mut self, update: TicketStateUpdate) -> bool {
        match self.ticket_mut(update.ticket_id) {
            Some(ticket)
                if ticket.payment_status == PaymentStatus::Pending
                    && ticket.status == TicketStatus::Pending =>
            {
                ticket.status = update.status;
                ticket.payment_status = update.payment_status;
                ticket.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_day(&self, day: EventDay) {
        self.state.write().await.days.push(day);
    }

    pub async fn insert_session(&self, session: EventSession) {
        self.state.write().await.sessions.push(session);
    }

    pub async fn insert_price(&self, price: TicketPrice) {
        self.state.write().await.prices.push(price);
    }

    pub async fn insert_payment_method(&self, method: PaymentMethod) {
        let mut state = self.state.write().await;
        state.payment_methods.retain(|m| m.id != method.id);
        state.payment_methods.push(method);
    }

    pub async fn ticket_count(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl TicketingStore for MemoryStore {
    async fn find_day(&self, id: Uuid) -> Result<Option<EventDay>> {
        Ok(self.state.read().await.days.iter().find(|d| d.id == id).cloned())
    }

    async fn find_day_by_date(&self, date: NaiveDate) -> Result<Option<EventDay>> {
        let state = self.state.read().await;
        let mut matches: Vec<&EventDay> = state.days.iter().filter(|d| d.date == date).collect();
        matches.sort_by_key(|d| !d.is_active);
        Ok(matches.first().map(|d| (*d).clone()))
    }

    async fn find_day_by_name(&self, name: &str) -> Result<Option<EventDay>> {
        let state = self.state.read().await;
        let wanted = name.trim().to_lowercase();
        let mut matches: Vec<&EventDay> = state
            .days
            .iter()
            .filter(|d| d.name.to_lowercase() == wanted)
            .collect();
        matches.sort_by_key(|d| !d.is_active);
        Ok(matches.first().map(|d| (*d).clone()))
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<EventSession>> {
        Ok(self.state.read().await.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_sessions_for_day(&self, day_id: Uuid) -> Result<Vec<EventSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<EventSession> = state
            .sessions
            .iter()
            .filter(|s| s.day_id == day_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn find_active_price(&self, ticket_type: TicketType, day_id: Uuid) -> Result<Option<TicketPrice>> {
        let state = self.state.read().await;
        let active = || {
            state
                .prices
                .iter()
                .filter(move |p| p.is_active && p.ticket_type == ticket_type)
        };

        let specific = active().filter(|p| p.day_id == Some(day_id)).last();
        let general = active().filter(|p| p.day_id.is_none()).last();
        Ok(specific.or(general).cloned())
    }

    async fn find_payment_method(&self, id: &str) -> Result<Option<PaymentMethod>> {
        let wanted = id.trim();
        Ok(self
            .state
            .read()
            .await
            .payment_methods
            .iter()
            .find(|m| m.id.eq_ignore_ascii_case(wanted))
            .cloned())
    }

    async fn ticket_code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.state.read().await.tickets.iter().any(|t| t.ticket_code == code))
    }

    async fn create_ticket_bundle(
        &self,
        ticket: &Ticket,
        attendees: &[Attendee],
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if state.tickets.iter().any(|t| t.ticket_code == ticket.ticket_code) {
            return Err(AppError::Conflict(format!(
                "Ticket code {} already exists",
                ticket.ticket_code
            )));
        }

        state.tickets.push(ticket.clone());
        state.attendees.extend(attendees.iter().cloned());
        if let Some(transaction) = transaction {
            state.transactions.push(transaction.clone());
        }
        Ok(())
    }

    async fn find_ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        Ok(self.state.read().await.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        Ok(self
            .state
            .read()
            .await
            .tickets
            .iter()
            .find(|t| t.ticket_code == code)
            .cloned())
    }

    async fn find_tickets_by_purchaser(&self, phone: &str, name: &str) -> Result<Vec<Ticket>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .state
            .read()
            .await
            .tickets
            .iter()
            .filter(|t| t.purchaser_phone == phone && t.purchaser_name.to_lowercase() == wanted)
            .cloned()
            .collect())
    }

    async fn record_payment_outcome(
        &self,
        transaction: &PaymentTransaction,
        ticket_update: Option<TicketStateUpdate>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.transactions.push(transaction.clone());
        if let Some(update) = ticket_update {
            state.apply_payment_state(update);
        }
        Ok(())
    }

    async fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .rev()
            .find(|t| t.external_id == external_id)
            .cloned())
    }

    async fn find_transactions_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| t.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn settle_transaction(
        &self,
        settlement: TransactionSettlement,
        ticket_update: TicketStateUpdate,
    ) -> Result<bool> {
        let mut state = self.state.write().await;

        let Some(transaction) = state
            .transactions
            .iter_mut()
            .find(|t| t.id == settlement.transaction_id && t.status == TransactionStatus::Pending)
        else {
            return Ok(false);
        };

        transaction.status = settlement.status;
        if settlement.error_message.is_some() {
            transaction.error_message = settlement.error_message;
        }
        if let Some(verification) = settlement.verification {
            let mut metadata = transaction
                .metadata
                .take()
                .unwrap_or_else(|| serde_json::json!({}));
            if let Some(object) = metadata.as_object_mut() {
                object.insert("verification".to_string(), verification);
            }
            transaction.metadata = Some(metadata);
        }
        transaction.updated_at = Utc::now();

        state.apply_payment_state(ticket_update);
        Ok(true)
    }

    async fn find_attendees(&self, ticket_id: Uuid, ticket_type: TicketType) -> Result<Vec<Attendee>> {
        Ok(self
            .state
            .read()
            .await
            .attendees
            .iter()
            .filter(|a| a.ticket_id == ticket_id && a.ticket_type() == ticket_type)
            .cloned()
            .collect())
    }

    async fn mark_ticket_used(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;

        match state.ticket_mut(ticket_id) {
            Some(ticket) if ticket.status != TicketStatus::Used => {
                ticket.status = TicketStatus::Used;
                ticket.updated_at = at;
            }
            _ => return Ok(false),
        }

        for attendee in state.attendees.iter_mut().filter(|a| a.ticket_id == ticket_id) {
            attendee.mark_scanned(at);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TicketMetadata, TicketSource};
    use rust_decimal_macros::dec;

    fn ticket(code: &str, phone: &str, name: &str) -> Ticket {
        Ticket::new(
            code.to_string(),
            Uuid::new_v4(),
            name.to_string(),
            phone.to_string(),
            TicketType::Adult,
            dec!(10000),
            1,
            "mpesa".to_string(),
            TicketMetadata::new(TicketSource::Purchase { submitted_at: Utc::now() }, Uuid::new_v4()),
        )
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let store = MemoryStore::new();
        store
            .create_ticket_bundle(&ticket("TK000000010001", "255712345678", "Asha"), &[], None)
            .await
            .unwrap();

        let result = store
            .create_ticket_bundle(&ticket("TK000000010001", "255712345679", "Baraka"), &[], None)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_used_only_once() {
        let store = MemoryStore::new();
        let t = ticket("TK000000010002", "255712345678", "Asha");
        store.create_ticket_bundle(&t, &[], None).await.unwrap();

        assert!(store.mark_ticket_used(t.id, Utc::now()).await.unwrap());
        assert!(!store.mark_ticket_used(t.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_purchaser_lookup_ignores_name_case() {
        let store = MemoryStore::new();
        let first = ticket("TK000000010003", "255712345678", "Asha Juma");
        store.create_ticket_bundle(&first, &[], None).await.unwrap();
        store
            .create_ticket_bundle(&ticket("TK000000010004", "255712345678", "ASHA JUMA"), &[], None)
            .await
            .unwrap();

        let found = store
            .find_tickets_by_purchaser("255712345678", "asha juma")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, first.id);
    }

    #[tokio::test]
    async fn test_settle_requires_pending() {
        let store = MemoryStore::new();
        let t = ticket("TK000000010005", "255712345678", "Asha");
        let txn = PaymentTransaction::new(
            t.id,
            t.payment_reference(),
            "Mpesa".to_string(),
            "255712345678".to_string(),
            dec!(10000),
            TransactionStatus::Failed,
        );
        store.create_ticket_bundle(&t, &[], Some(&txn)).await.unwrap();

        let settled = store
            .settle_transaction(
                TransactionSettlement {
                    transaction_id: txn.id,
                    status: TransactionStatus::Completed,
                    error_message: None,
                    verification: None,
                },
                TicketStateUpdate::paid(t.id),
            )
            .await
            .unwrap();

        assert!(!settled);
        let ticket = store.find_ticket_by_id(t.id).await.unwrap().unwrap();
        assert_eq!(ticket.payment_status, PaymentStatus::Pending);
    }
}
