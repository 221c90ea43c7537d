use crate::error::{AppError, Result};
use crate::models::{
    Attendee, AttendeeDetails, AuditStep, DuplicateLink, InstitutionType, PaymentStatus,
    PaymentTransaction, StudentDetails, Ticket, TicketMetadata, TicketSource, TicketStatus,
    TicketType, TransactionStatus,
};
use crate::observability::{get_metrics, mask_phone};
use crate::repositories::TicketingStore;
use crate::services::validation::ResolvedEntities;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at finding an unused ticket code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Which code family a ticket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeKind {
    /// `TK` + 8 timestamp digits + 4 random digits.
    Purchase,
    /// `IMP` + 6 timestamp digits + 3 random digits.
    Import,
}

/// Generates a human-presentable ticket code from the clock and random digits.
pub fn generate_ticket_code(kind: CodeKind, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().unsigned_abs();
    let mut rng = rand::thread_rng();

    match kind {
        CodeKind::Purchase => format!(
            "TK{:08}{:04}",
            millis % 100_000_000,
            rng.gen_range(0..10_000u32)
        ),
        CodeKind::Import => format!(
            "IMP{:06}{:03}",
            millis % 1_000_000,
            rng.gen_range(0..1_000u32)
        ),
    }
}

/// Ticket status state machine.
#[derive(Debug, Clone)]
pub struct TicketStateMachine;

impl TicketStateMachine {
    /// Returns valid next states from the current state.
    pub fn valid_transitions(current: TicketStatus) -> Vec<TicketStatus> {
        match current {
            TicketStatus::Pending => vec![TicketStatus::Active, TicketStatus::Failed],
            TicketStatus::Active => vec![TicketStatus::Used],
            TicketStatus::Used => vec![],   // Terminal state
            TicketStatus::Failed => vec![], // Terminal state
        }
    }

    pub fn can_transition(from: TicketStatus, to: TicketStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    /// Performs a state transition if valid.
    pub fn transition(from: TicketStatus, to: TicketStatus) -> Result<TicketStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Validation(format!(
                "Invalid ticket status transition from {:?} to {:?}",
                from, to
            )))
        }
    }
}

/// Payment status state machine. Payment never moves backward.
#[derive(Debug, Clone)]
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    pub fn valid_transitions(current: PaymentStatus) -> Vec<PaymentStatus> {
        match current {
            PaymentStatus::Pending => vec![PaymentStatus::Paid, PaymentStatus::Failed],
            PaymentStatus::Paid | PaymentStatus::Failed | PaymentStatus::Complimentary => vec![],
        }
    }

    pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: PaymentStatus, to: PaymentStatus) -> Result<PaymentStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Validation(format!(
                "Invalid payment status transition from {:?} to {:?}",
                from, to
            )))
        }
    }
}

/// Builds the `quantity` attendee rows for a ticket.
///
/// Names get an ordinal suffix when more than one person is admitted.
pub fn build_attendees(
    ticket: &Ticket,
    student: Option<&StudentDetails>,
    parent_name: Option<&str>,
) -> Result<Vec<Attendee>> {
    let quantity = usize::try_from(ticket.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| AppError::Validation(format!("Invalid quantity {}", ticket.quantity)))?;

    let details = match ticket.ticket_type {
        TicketType::Adult => AttendeeDetails::Adult,
        TicketType::Student => {
            let student = student
                .filter(|s| !s.student_id.trim().is_empty())
                .ok_or_else(|| AppError::Validation("Student ticket requires a student ID".to_string()))?;
            AttendeeDetails::Student {
                student_id: student.student_id.trim().to_string(),
                institution_type: student.institution_type.unwrap_or(InstitutionType::Other),
                institution_name: student.institution_name.clone(),
                is_used: false,
                scanned_at: None,
            }
        }
        TicketType::Child => AttendeeDetails::Child {
            parent_name: parent_name.map(str::to_string),
        },
    };

    let attendees = (1..=quantity)
        .map(|n| {
            let full_name = if quantity > 1 {
                format!("{} ({})", ticket.purchaser_name, n)
            } else {
                ticket.purchaser_name.clone()
            };
            Attendee::new(ticket.id, full_name, ticket.purchaser_phone.clone(), details.clone())
        })
        .collect();

    Ok(attendees)
}

/// Input for creating a ticket from a validated request.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub kind: CodeKind,
    pub resolved: ResolvedEntities,
    pub source: TicketSource,
    pub audit: Vec<AuditStep>,
    pub duplicate_of: Option<DuplicateLink>,
}

/// Records written for one ticket.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTicket {
    pub ticket_id: Uuid,
    pub ticket_code: String,
    pub ticket: Ticket,
    pub attendees: Vec<Attendee>,
    pub transaction: Option<PaymentTransaction>,
}

/// Owns creation of tickets, their attendees and, for imports, the
/// offline payment record.
pub struct TicketLifecycleManager {
    store: Arc<dyn TicketingStore>,
}

impl TicketLifecycleManager {
    pub fn new(store: Arc<dyn TicketingStore>) -> Self {
        Self { store }
    }

    /// Picks a code that is not yet taken.
    pub async fn allocate_code(&self, kind: CodeKind) -> Result<String> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_ticket_code(kind, Utc::now());
            if !self.store.ticket_code_exists(&code).await? {
                return Ok(code);
            }
            warn!(code = %code, attempt, "Ticket code collision, regenerating");
        }

        Err(AppError::Conflict(format!(
            "Could not allocate a unique ticket code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Creates the ticket and its attendees in one store write.
    ///
    /// Purchases start PENDING/PENDING. Imports are written ACTIVE/PAID with a
    /// COMPLETED `IMPORT-{code}` transaction.
    pub async fn create_ticket(&self, new_ticket: NewTicket) -> Result<CreatedTicket> {
        let mut last_conflict = None;

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.allocate_code(new_ticket.kind).await?;
            let (ticket, attendees, transaction) = assemble(&new_ticket, code)?;

            match self
                .store
                .create_ticket_bundle(&ticket, &attendees, transaction.as_ref())
                .await
            {
                Ok(()) => {
                    get_metrics().record_ticket_created(ticket.ticket_type.as_str(), ticket.is_imported);
                    info!(
                        ticket_code = %ticket.ticket_code,
                        ticket_type = %ticket.ticket_type,
                        quantity = ticket.quantity,
                        phone = %mask_phone(&ticket.purchaser_phone),
                        imported = ticket.is_imported,
                        "Ticket created"
                    );
                    return Ok(CreatedTicket {
                        ticket_id: ticket.id,
                        ticket_code: ticket.ticket_code.clone(),
                        ticket,
                        attendees,
                        transaction,
                    });
                }
                // Another writer took the code between the check and the insert.
                Err(AppError::Conflict(message)) => {
                    warn!(ticket_code = %ticket.ticket_code, "Ticket code taken during insert, retrying");
                    last_conflict = Some(message);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(last_conflict.unwrap_or_else(|| {
            "Could not allocate a unique ticket code".to_string()
        })))
    }
}

fn assemble(
    new_ticket: &NewTicket,
    code: String,
) -> Result<(Ticket, Vec<Attendee>, Option<PaymentTransaction>)> {
    let resolved = &new_ticket.resolved;

    let metadata = TicketMetadata::new(new_ticket.source.clone(), resolved.day.id)
        .with_unit_price(resolved.unit_price)
        .with_student(resolved.student.clone())
        .with_child(match resolved.ticket_type {
            TicketType::Child => Some(crate::models::ChildDetails {
                parent_name: resolved.parent_name.clone(),
            }),
            _ => None,
        })
        .with_duplicate_of(new_ticket.duplicate_of.clone())
        .with_validation(new_ticket.audit.clone());

    let mut ticket = Ticket::new(
        code,
        resolved.session.id,
        resolved.purchaser_name.clone(),
        resolved.purchaser_phone.clone(),
        resolved.ticket_type,
        resolved.total_amount,
        resolved.quantity,
        resolved.payment_method.id.clone(),
        metadata,
    );

    let transaction = match new_ticket.kind {
        CodeKind::Purchase => None,
        CodeKind::Import => {
            TicketStateMachine::transition(ticket.status, TicketStatus::Active)?;
            PaymentStateMachine::transition(ticket.payment_status, PaymentStatus::Paid)?;
            ticket = ticket.imported();

            let transaction = PaymentTransaction::new(
                ticket.id,
                format!("IMPORT-{}", ticket.ticket_code),
                resolved.payment_method.provider.clone(),
                ticket.purchaser_phone.clone(),
                ticket.total_amount,
                TransactionStatus::Completed,
            )
            .with_metadata(json!({
                "source": "IMPORT",
                "payment_method_id": resolved.payment_method.id,
                "applied_defaults": resolved.applied_defaults,
            }));
            Some(transaction)
        }
    };

    let attendees = build_attendees(&ticket, resolved.student.as_ref(), resolved.parent_name.as_deref())?;

    Ok((ticket, attendees, transaction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn ticket(ticket_type: TicketType, quantity: i32) -> Ticket {
        Ticket::new(
            "TK123456781234".to_string(),
            Uuid::new_v4(),
            "Rehema Ally".to_string(),
            "255754000111".to_string(),
            ticket_type,
            dec!(5000) * rust_decimal::Decimal::from(quantity),
            quantity,
            "mpesa".to_string(),
            TicketMetadata::new(TicketSource::Purchase { submitted_at: Utc::now() }, Uuid::new_v4()),
        )
    }

    #[test]
    fn test_code_formats() {
        let purchase = Regex::new(r"^TK\d{8}\d{4}$").unwrap();
        let import = Regex::new(r"^IMP\d{6}\d{3}$").unwrap();

        for _ in 0..50 {
            assert!(purchase.is_match(&generate_ticket_code(CodeKind::Purchase, Utc::now())));
            assert!(import.is_match(&generate_ticket_code(CodeKind::Import, Utc::now())));
        }
    }

    #[test]
    fn test_purchase_codes_rarely_collide() {
        let now = Utc::now();
        let codes: HashSet<String> = (0..20)
            .map(|_| generate_ticket_code(CodeKind::Purchase, now))
            .collect();
        // 4 random digits at a fixed instant; a handful of collisions at most.
        assert!(codes.len() >= 15);
    }

    #[test]
    fn test_ticket_state_machine() {
        assert!(TicketStateMachine::can_transition(TicketStatus::Pending, TicketStatus::Active));
        assert!(TicketStateMachine::can_transition(TicketStatus::Pending, TicketStatus::Failed));
        assert!(TicketStateMachine::can_transition(TicketStatus::Active, TicketStatus::Used));
        assert!(!TicketStateMachine::can_transition(TicketStatus::Used, TicketStatus::Active));
        assert!(!TicketStateMachine::can_transition(TicketStatus::Failed, TicketStatus::Active));
        assert!(TicketStateMachine::transition(TicketStatus::Used, TicketStatus::Used).is_err());
    }

    #[test]
    fn test_payment_never_moves_backward() {
        assert!(PaymentStateMachine::can_transition(PaymentStatus::Pending, PaymentStatus::Paid));
        assert!(!PaymentStateMachine::can_transition(PaymentStatus::Paid, PaymentStatus::Pending));
        assert!(!PaymentStateMachine::can_transition(PaymentStatus::Failed, PaymentStatus::Paid));
        assert!(PaymentStateMachine::transition(PaymentStatus::Paid, PaymentStatus::Failed).is_err());
    }

    #[test]
    fn test_attendee_names_get_ordinals() {
        let t = ticket(TicketType::Adult, 3);
        let attendees = build_attendees(&t, None, None).unwrap();

        assert_eq!(attendees.len(), 3);
        assert_eq!(attendees[0].full_name, "Rehema Ally (1)");
        assert_eq!(attendees[2].full_name, "Rehema Ally (3)");
        assert!(attendees.iter().all(|a| a.ticket_id == t.id));
    }

    #[test]
    fn test_single_attendee_keeps_name() {
        let t = ticket(TicketType::Child, 1);
        let attendees = build_attendees(&t, None, Some("Mama Rehema")).unwrap();
        assert_eq!(attendees[0].full_name, "Rehema Ally");
        assert_eq!(
            attendees[0].details,
            AttendeeDetails::Child { parent_name: Some("Mama Rehema".to_string()) }
        );
    }

    #[test]
    fn test_student_ticket_requires_student_id() {
        let t = ticket(TicketType::Student, 1);
        assert!(build_attendees(&t, None, None).is_err());

        let student = StudentDetails {
            student_id: "DIT-0042".to_string(),
            institution_type: Some(InstitutionType::College),
            institution_name: None,
        };
        let attendees = build_attendees(&t, Some(&student), None).unwrap();
        assert_eq!(attendees[0].student_id(), Some("DIT-0042"));
    }
}
