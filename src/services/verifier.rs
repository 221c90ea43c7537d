use crate::error::Result;
use crate::models::{Attendee, TicketStatus, TicketType};
use crate::observability::get_metrics;
use crate::repositories::TicketingStore;
use crate::utils::EventClock;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Shortest code the scanner accepts.
pub const MIN_CODE_LENGTH: usize = 8;

/// Stage of the scan pipeline. Also the tag returned on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStep {
    Format,
    Lookup,
    Payment,
    StudentId,
    Day,
    Session,
    Usage,
}

impl ScanStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStep::Format => "FORMAT",
            ScanStep::Lookup => "LOOKUP",
            ScanStep::Payment => "PAYMENT",
            ScanStep::StudentId => "STUDENT_ID",
            ScanStep::Day => "DAY",
            ScanStep::Session => "SESSION",
            ScanStep::Usage => "USAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationStep {
    pub step: ScanStep,
    pub passed: bool,
    pub message: String,
    pub details: serde_json::Value,
}

/// Admission summary for the scanning screen.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedTicket {
    pub verification_id: String,
    /// `"{passed}/{total}"` over the checks that ran.
    pub verification_score: String,
    pub ticket_id: Uuid,
    pub ticket_code: String,
    pub ticket_type: TicketType,
    pub purchaser_name: String,
    pub quantity: i32,
    pub session_name: String,
    pub day_name: String,
    pub attendees: Vec<Attendee>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    /// Failing stage, `None` on admission.
    pub step: Option<ScanStep>,
    pub message: String,
    pub steps: Vec<VerificationStep>,
    pub ticket: Option<VerifiedTicket>,
}

fn student_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9-]+$").expect("student id pattern is valid"))
}

/// Extracts the ticket code from a scanned payload.
///
/// QR codes may carry a URL whose last path segment is the code. Returns
/// `None` for payloads shorter than [`MIN_CODE_LENGTH`].
pub fn sanitize_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_suffix = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let code = without_suffix
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_uppercase();

    if code.chars().count() < MIN_CODE_LENGTH {
        None
    } else {
        Some(code)
    }
}

/// Builds the opaque audit id for an admission.
pub fn verification_id(ticket_id: Uuid, scanned_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.update(scanned_at.to_rfc3339().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("VER-{}", digest[..16].to_uppercase())
}

/// Gate scanner: an ordered pipeline that stops at the first failed check.
pub struct TicketVerifier {
    store: Arc<dyn TicketingStore>,
    clock: EventClock,
    pre_entry: Duration,
}

struct Pipeline {
    steps: Vec<VerificationStep>,
}

impl Pipeline {
    fn pass(&mut self, step: ScanStep, message: impl Into<String>, details: serde_json::Value) {
        self.steps.push(VerificationStep {
            step,
            passed: true,
            message: message.into(),
            details,
        });
    }

    fn reject(mut self, step: ScanStep, message: impl Into<String>, details: serde_json::Value) -> VerificationResult {
        let message = message.into();
        self.steps.push(VerificationStep {
            step,
            passed: false,
            message: message.clone(),
            details,
        });
        get_metrics().record_scan(step.as_str());
        info!(step = step.as_str(), reason = %message, "Ticket rejected at gate");

        VerificationResult {
            success: false,
            step: Some(step),
            message,
            steps: self.steps,
            ticket: None,
        }
    }
}

impl TicketVerifier {
    pub fn new(store: Arc<dyn TicketingStore>, clock: EventClock, pre_entry_minutes: i64) -> Self {
        Self {
            store,
            clock,
            pre_entry: Duration::minutes(pre_entry_minutes),
        }
    }

    /// Verifies a scanned code and, if every check passes, marks the ticket
    /// USED. Rejections are values tagged with the failing step.
    pub async fn verify_ticket(&self, raw_code: &str, require_student_id_check: bool) -> Result<VerificationResult> {
        let mut pipeline = Pipeline { steps: Vec::new() };

        // 1. Sanitize
        let Some(code) = sanitize_code(raw_code) else {
            return Ok(pipeline.reject(
                ScanStep::Format,
                "Invalid ticket code",
                json!({ "min_length": MIN_CODE_LENGTH }),
            ));
        };
        pipeline.pass(ScanStep::Format, "Code format valid", json!({ "code": code }));

        // 2. Lookup
        let Some(ticket) = self.store.find_ticket_by_code(&code).await? else {
            return Ok(pipeline.reject(ScanStep::Lookup, "Ticket not found", json!({ "code": code })));
        };
        let Some(session) = self.store.find_session(ticket.session_id).await? else {
            return Ok(pipeline.reject(
                ScanStep::Lookup,
                "Ticket session not found",
                json!({ "session_id": ticket.session_id }),
            ));
        };
        let Some(day) = self.store.find_day(session.day_id).await? else {
            return Ok(pipeline.reject(
                ScanStep::Lookup,
                "Event day not found",
                json!({ "day_id": session.day_id }),
            ));
        };
        let transactions = self.store.find_transactions_by_ticket(ticket.id).await?;
        let attendees = self.store.find_attendees(ticket.id, ticket.ticket_type).await?;
        if attendees.is_empty() {
            return Ok(pipeline.reject(
                ScanStep::Lookup,
                "No attendees recorded for ticket",
                json!({ "ticket_type": ticket.ticket_type }),
            ));
        }
        pipeline.pass(
            ScanStep::Lookup,
            "Ticket found",
            json!({ "ticket_id": ticket.id, "session": session.name, "day": day.name }),
        );

        // 3. Payment
        let paid_by_transaction = transactions.iter().any(|t| t.status.is_settled());
        if !(ticket.payment_status.is_settled() || paid_by_transaction) {
            return Ok(pipeline.reject(
                ScanStep::Payment,
                "Ticket has not been paid",
                json!({ "payment_status": ticket.payment_status, "transactions": transactions.len() }),
            ));
        }
        pipeline.pass(
            ScanStep::Payment,
            "Payment confirmed",
            json!({ "payment_status": ticket.payment_status, "by_transaction": paid_by_transaction }),
        );

        // 4. Student ID
        if require_student_id_check && ticket.ticket_type == TicketType::Student {
            let invalid: Vec<&str> = attendees
                .iter()
                .filter_map(Attendee::student_id)
                .filter(|id| !student_id_pattern().is_match(id.trim()))
                .collect();
            let missing = attendees.iter().any(|a| a.student_id().is_none());

            if missing || !invalid.is_empty() {
                return Ok(pipeline.reject(
                    ScanStep::StudentId,
                    "Student ID is missing or malformed",
                    json!({ "invalid": invalid }),
                ));
            }
            pipeline.pass(ScanStep::StudentId, "Student ID valid", json!({}));
        }

        let now_utc = self.clock.now_utc();
        let now_local = now_utc.with_timezone(&self.clock.timezone());

        // 5. Date
        let today = now_local.date_naive();
        if !day.is_on(today) {
            return Ok(pipeline.reject(
                ScanStep::Day,
                format!("Ticket is for {} ({}), not today", day.name, day.date),
                json!({ "event_date": day.date, "today": today }),
            ));
        }
        pipeline.pass(ScanStep::Day, "Event day is today", json!({ "date": today }));

        // 6. Time window
        let window = session.entry_window(self.pre_entry);
        let local_time = now_local.time();
        if !window.contains(local_time) {
            return Ok(pipeline.reject(
                ScanStep::Session,
                format!("Outside entry window for {}", session.name),
                json!({
                    "opens_at": window.opens_at,
                    "closes_at": window.closes_at,
                    "local_time": local_time.format("%H:%M:%S").to_string(),
                }),
            ));
        }
        pipeline.pass(
            ScanStep::Session,
            "Within entry window",
            json!({ "opens_at": window.opens_at, "closes_at": window.closes_at }),
        );

        // 7. Usage
        if ticket.status == TicketStatus::Used {
            return Ok(pipeline.reject(
                ScanStep::Usage,
                "Ticket has already been used",
                json!({ "status": ticket.status, "last_update": ticket.updated_at }),
            ));
        }

        // 8. Commit
        if !self.store.mark_ticket_used(ticket.id, now_utc).await? {
            warn!(ticket_code = %ticket.ticket_code, "Concurrent scan won the race");
            return Ok(pipeline.reject(
                ScanStep::Usage,
                "Ticket has already been used",
                json!({ "concurrent": true }),
            ));
        }
        pipeline.pass(ScanStep::Usage, "Ticket admitted", json!({ "scanned_at": now_utc }));

        let attendees = self.store.find_attendees(ticket.id, ticket.ticket_type).await?;
        let passed = pipeline.steps.iter().filter(|s| s.passed).count();
        let total = pipeline.steps.len();

        get_metrics().record_scan("ADMITTED");
        info!(ticket_code = %ticket.ticket_code, quantity = ticket.quantity, "Ticket admitted");

        Ok(VerificationResult {
            success: true,
            step: None,
            message: "Ticket verified".to_string(),
            ticket: Some(VerifiedTicket {
                verification_id: verification_id(ticket.id, now_utc),
                verification_score: format!("{}/{}", passed, total),
                ticket_id: ticket.id,
                ticket_code: ticket.ticket_code,
                ticket_type: ticket.ticket_type,
                purchaser_name: ticket.purchaser_name,
                quantity: ticket.quantity,
                session_name: session.name,
                day_name: day.name,
                attendees,
                scanned_at: now_utc,
            }),
            steps: pipeline.steps,
        })
    }
}
