#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_office::api::{AppState, ServiceOptions};
use ticket_office::error::{AppError, Result};
use ticket_office::gateways::{
    CheckoutRequest, CheckoutResponse, PaymentGateway, SmsDelivery, SmsSender, VerifyResponse,
};
use ticket_office::models::{
    Attendee, EventDay, EventSession, PaymentMethod, PaymentTransaction, Ticket, TicketPrice,
    TicketType,
};
use ticket_office::observability::HealthChecker;
use ticket_office::repositories::{
    MemoryStore, TicketStateUpdate, TicketingStore, TransactionSettlement,
};
use ticket_office::utils::{EventClock, FixedClock};
use uuid::Uuid;

pub const TZ: Tz = chrono_tz::Africa::Dar_es_Salaam;

pub fn event_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()
}

/// What the fake gateway answers to a checkout.
#[derive(Debug, Clone)]
pub enum CheckoutAnswer {
    Accept(String),
    Refuse(String),
    Unreachable,
}

pub struct FakePaymentGateway {
    checkout: Mutex<CheckoutAnswer>,
    /// `None` makes verification fail as a transport error.
    verify_status: Mutex<Option<String>>,
    pub checkout_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub last_verify_id: Mutex<Option<String>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self {
            checkout: Mutex::new(CheckoutAnswer::Accept("AZ-0001".to_string())),
            verify_status: Mutex::new(Some("PENDING".to_string())),
            checkout_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            last_verify_id: Mutex::new(None),
        }
    }

    pub fn answer_checkout(&self, answer: CheckoutAnswer) {
        *self.checkout.lock().unwrap() = answer;
    }

    pub fn answer_verify(&self, status: Option<&str>) {
        *self.verify_status.lock().unwrap() = status.map(str::to_string);
    }

    pub fn checkout_count(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn checkout(&self, _request: &CheckoutRequest) -> Result<CheckoutResponse> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        match self.checkout.lock().unwrap().clone() {
            CheckoutAnswer::Accept(id) => Ok(CheckoutResponse::success(id)),
            CheckoutAnswer::Refuse(message) => Ok(CheckoutResponse::rejected(message)),
            CheckoutAnswer::Unreachable => Err(AppError::PaymentGateway("connection refused".to_string())),
        }
    }

    async fn verify(&self, external_id: &str) -> Result<VerifyResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verify_id.lock().unwrap() = Some(external_id.to_string());
        match self.verify_status.lock().unwrap().clone() {
            Some(status) => Ok(VerifyResponse::with_payment_status(status)),
            None => Err(AppError::PaymentGateway("timeout".to_string())),
        }
    }
}

/// Captures every message instead of sending it.
#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: Mutex<bool>,
}

impl RecordingSms {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_all(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send(&self, phone: &str, message: &str) -> Result<SmsDelivery> {
        if *self.failing.lock().unwrap() {
            return Ok(SmsDelivery::failed("provider rejected message"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((phone.to_string(), message.to_string()));
        Ok(SmsDelivery::delivered(format!("msg-{}", sent.len())))
    }
}

/// Delegates to a [`MemoryStore`]. Once armed, the next committed write
/// makes every later session, day and ticket lookup fail.
pub struct ReadFailingStore {
    inner: Arc<MemoryStore>,
    armed: AtomicBool,
    failing: AtomicBool,
}

impl ReadFailingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_reads_after_next_write(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn committed(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.failing.store(true, Ordering::SeqCst);
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TicketingStore for ReadFailingStore {
    async fn find_day(&self, id: Uuid) -> Result<Option<EventDay>> {
        self.check()?;
        self.inner.find_day(id).await
    }

    async fn find_day_by_date(&self, date: NaiveDate) -> Result<Option<EventDay>> {
        self.inner.find_day_by_date(date).await
    }

    async fn find_day_by_name(&self, name: &str) -> Result<Option<EventDay>> {
        self.inner.find_day_by_name(name).await
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<EventSession>> {
        self.check()?;
        self.inner.find_session(id).await
    }

    async fn find_sessions_for_day(&self, day_id: Uuid) -> Result<Vec<EventSession>> {
        self.inner.find_sessions_for_day(day_id).await
    }

    async fn find_active_price(&self, ticket_type: TicketType, day_id: Uuid) -> Result<Option<TicketPrice>> {
        self.inner.find_active_price(ticket_type, day_id).await
    }

    async fn find_payment_method(&self, id: &str) -> Result<Option<PaymentMethod>> {
        self.inner.find_payment_method(id).await
    }

    async fn ticket_code_exists(&self, code: &str) -> Result<bool> {
        self.inner.ticket_code_exists(code).await
    }

    async fn create_ticket_bundle(
        &self,
        ticket: &Ticket,
        attendees: &[Attendee],
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()> {
        self.inner.create_ticket_bundle(ticket, attendees, transaction).await?;
        self.committed();
        Ok(())
    }

    async fn find_ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        self.check()?;
        self.inner.find_ticket_by_id(id).await
    }

    async fn find_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        self.inner.find_ticket_by_code(code).await
    }

    async fn find_tickets_by_purchaser(&self, phone: &str, name: &str) -> Result<Vec<Ticket>> {
        self.inner.find_tickets_by_purchaser(phone, name).await
    }

    async fn record_payment_outcome(
        &self,
        transaction: &PaymentTransaction,
        ticket_update: Option<TicketStateUpdate>,
    ) -> Result<()> {
        self.inner.record_payment_outcome(transaction, ticket_update).await
    }

    async fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        self.inner.find_transaction_by_external_id(external_id).await
    }

    async fn find_transactions_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        self.inner.find_transactions_by_ticket(ticket_id).await
    }

    async fn settle_transaction(
        &self,
        settlement: TransactionSettlement,
        ticket_update: TicketStateUpdate,
    ) -> Result<bool> {
        let settled = self.inner.settle_transaction(settlement, ticket_update).await?;
        self.committed();
        Ok(settled)
    }

    async fn find_attendees(&self, ticket_id: Uuid, ticket_type: TicketType) -> Result<Vec<Attendee>> {
        self.inner.find_attendees(ticket_id, ticket_type).await
    }

    async fn mark_ticket_used(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_ticket_used(ticket_id, at).await
    }
}

/// A seeded event with fake gateways and a pinned clock.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakePaymentGateway>,
    pub sms: Arc<RecordingSms>,
    pub clock: Arc<FixedClock>,
    pub day_id: Uuid,
    pub inactive_day_id: Uuid,
    pub morning_id: Uuid,
    pub evening_id: Uuid,
    pub other_day_session_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        let day = EventDay::new("Day 1", event_date());
        let inactive = EventDay::new("Day 0", NaiveDate::from_ymd_opt(2024, 12, 19).unwrap()).inactive();
        let morning = EventSession::new(day.id, "Morning", time(9, 0), time(12, 0));
        let evening = EventSession::new(day.id, "Evening", time(18, 0), time(22, 0));
        let other = EventSession::new(inactive.id, "Evening", time(18, 0), time(22, 0));

        let harness = Self {
            day_id: day.id,
            inactive_day_id: inactive.id,
            morning_id: morning.id,
            evening_id: evening.id,
            other_day_session_id: other.id,
            store: store.clone(),
            gateway: Arc::new(FakePaymentGateway::new()),
            sms: Arc::new(RecordingSms::default()),
            clock: Arc::new(FixedClock::at_local(TZ, event_date().and_time(time(16, 5)))),
        };

        store.insert_day(day).await;
        store.insert_day(inactive).await;
        store.insert_session(morning).await;
        store.insert_session(evening).await;
        store.insert_session(other).await;
        store.insert_price(TicketPrice::new(TicketType::Adult, dec!(10000), None)).await;
        store.insert_price(TicketPrice::new(TicketType::Student, dec!(5000), None)).await;
        store.insert_price(TicketPrice::new(TicketType::Child, dec!(3000), None)).await;
        for (id, name, provider) in [
            ("mpesa", "M-Pesa", "Mpesa"),
            ("tigopesa", "Tigo Pesa", "Tigo"),
            ("airtelmoney", "Airtel Money", "Airtel"),
            ("halopesa", "HaloPesa", "Halopesa"),
        ] {
            store.insert_payment_method(PaymentMethod::new(id, name, provider)).await;
        }
        store.insert_payment_method(PaymentMethod::cash()).await;

        harness
    }

    pub fn event_clock(&self) -> EventClock {
        EventClock::new(TZ, self.clock.clone())
    }

    /// Moves the clock to a local wall-clock time on the given date.
    pub fn set_local(&self, date: NaiveDate, hour: u32, minute: u32) {
        let local = date.and_time(time(hour, minute));
        let utc = TZ
            .from_local_datetime(&local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        self.clock.set(utc);
    }

    pub fn options(&self) -> ServiceOptions {
        ServiceOptions {
            row_delay: Duration::ZERO,
            ..ServiceOptions::default()
        }
    }

    pub fn state(&self) -> AppState {
        self.state_with_store(self.store.clone())
    }

    pub fn state_with_store(&self, store: Arc<dyn TicketingStore>) -> AppState {
        AppState::new(
            store,
            self.gateway.clone(),
            self.sms.clone(),
            self.event_clock(),
            self.options(),
            Arc::new(HealthChecker::in_memory(true)),
        )
    }
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}
