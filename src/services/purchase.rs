use crate::error::Result;
use crate::models::{Attendee, Ticket, TicketSource};
use crate::notifications::{ticket_vars, NotificationKind, NotificationOutcome, NotificationService};
use crate::observability::mask_phone;
use crate::repositories::TicketingStore;
use crate::services::payment::{PaymentService, PaymentSubmission};
use crate::services::ticket_lifecycle::{CodeKind, NewTicket, TicketLifecycleManager};
use crate::services::validation::{TicketRequest, ValidationEngine, ValidationMode, ValidationOutcome};
use crate::utils::EventClock;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Outcome of an interactive purchase.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResult {
    pub success: bool,
    pub message: String,
    pub validation: ValidationOutcome,
    pub ticket: Option<Ticket>,
    pub attendees: Vec<Attendee>,
    /// `None` for cash sales, which are settled at the counter.
    pub payment: Option<PaymentSubmission>,
    pub notification: Option<NotificationOutcome>,
}

impl PurchaseResult {
    fn rejected(validation: ValidationOutcome) -> Self {
        Self {
            success: false,
            message: validation
                .error
                .clone()
                .unwrap_or_else(|| "Validation failed".to_string()),
            validation,
            ticket: None,
            attendees: Vec::new(),
            payment: None,
            notification: None,
        }
    }
}

/// Strict validation, ticket creation, payment submission and the
/// acknowledgement SMS, in that order.
pub struct PurchaseService {
    store: Arc<dyn TicketingStore>,
    engine: ValidationEngine,
    lifecycle: TicketLifecycleManager,
    payments: Arc<PaymentService>,
    notifications: NotificationService,
    clock: EventClock,
}

impl PurchaseService {
    pub fn new(
        store: Arc<dyn TicketingStore>,
        payments: Arc<PaymentService>,
        notifications: NotificationService,
        clock: EventClock,
        max_quantity: i32,
    ) -> Self {
        Self {
            engine: ValidationEngine::new(store.clone(), max_quantity),
            lifecycle: TicketLifecycleManager::new(store.clone()),
            store,
            payments,
            notifications,
            clock,
        }
    }

    /// Dry run: runs the strict checks without writing anything.
    pub async fn validate(&self, request: &TicketRequest) -> Result<ValidationOutcome> {
        self.engine.validate(request, ValidationMode::Strict).await
    }

    pub async fn purchase(&self, request: &TicketRequest) -> Result<PurchaseResult> {
        let validation = self.engine.validate(request, ValidationMode::Strict).await?;
        let Some(resolved) = validation.resolved.clone() else {
            return Ok(PurchaseResult::rejected(validation));
        };

        let method = resolved.payment_method.clone();
        let created = self
            .lifecycle
            .create_ticket(NewTicket {
                kind: CodeKind::Purchase,
                resolved,
                source: TicketSource::Purchase {
                    submitted_at: self.clock.now_utc(),
                },
                audit: validation.audit_trail(),
                duplicate_of: None,
            })
            .await?;

        if method.is_cash() {
            info!(ticket_code = %created.ticket_code, "Cash sale recorded, awaiting counter payment");
            return Ok(PurchaseResult {
                success: true,
                message: "Ticket reserved. Pay at the counter.".to_string(),
                validation,
                ticket: Some(created.ticket),
                attendees: created.attendees,
                payment: None,
                notification: None,
            });
        }

        let submission = self.payments.submit_payment(&created.ticket, &method).await?;
        if !submission.success {
            // Re-read so the caller sees the FAILED state.
            let ticket = self
                .store
                .find_ticket_by_id(created.ticket_id)
                .await?
                .unwrap_or(created.ticket);
            return Ok(PurchaseResult {
                success: false,
                message: submission.message.clone(),
                validation,
                ticket: Some(ticket),
                attendees: created.attendees,
                payment: Some(submission),
                notification: None,
            });
        }

        let vars = ticket_vars(self.store.as_ref(), &created.ticket).await;
        let notification = self
            .notifications
            .notify(
                NotificationKind::PurchaseAcknowledgement,
                &created.ticket.purchaser_phone,
                &vars,
            )
            .await;

        info!(
            ticket_code = %created.ticket_code,
            phone = %mask_phone(&created.ticket.purchaser_phone),
            external_id = %submission.transaction.external_id,
            "Purchase submitted"
        );

        Ok(PurchaseResult {
            success: true,
            message: submission.message.clone(),
            validation,
            ticket: Some(created.ticket),
            attendees: created.attendees,
            payment: Some(submission),
            notification: Some(notification),
        })
    }
}
