pub mod templates;

pub use templates::{render_template, TemplateVars};

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateways::SmsSender;
use crate::models::Ticket;
use crate::observability::{get_metrics, mask_phone};
use crate::repositories::TicketingStore;
use crate::utils::format_amount;

/// Messages the ticket office sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PurchaseAcknowledgement,
    PaymentConfirmation,
    ImportWelcome,
    ImportDuplicate,
}

impl NotificationKind {
    pub fn template(&self) -> &'static str {
        match self {
            NotificationKind::PurchaseAcknowledgement => templates::PURCHASE_ACKNOWLEDGEMENT,
            NotificationKind::PaymentConfirmation => templates::PAYMENT_CONFIRMATION,
            NotificationKind::ImportWelcome => templates::IMPORT_WELCOME,
            NotificationKind::ImportDuplicate => templates::IMPORT_DUPLICATE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PurchaseAcknowledgement => "purchase_acknowledgement",
            NotificationKind::PaymentConfirmation => "payment_confirmation",
            NotificationKind::ImportWelcome => "import_welcome",
            NotificationKind::ImportDuplicate => "import_duplicate",
        }
    }
}

/// Result of one notification attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub sent: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Renders templates and hands plain text to the SMS provider.
///
/// Delivery problems are reported in the outcome and never returned as
/// errors.
#[derive(Clone)]
pub struct NotificationService {
    sms: Arc<dyn SmsSender>,
}

impl NotificationService {
    pub fn new(sms: Arc<dyn SmsSender>) -> Self {
        Self { sms }
    }

    pub async fn notify(&self, kind: NotificationKind, phone: &str, vars: &TemplateVars) -> NotificationOutcome {
        let message = render_template(kind.template(), vars);

        let outcome = match self.sms.send(phone, &message).await {
            Ok(delivery) if delivery.success => {
                info!(
                    template = kind.as_str(),
                    phone = %mask_phone(phone),
                    message_id = ?delivery.message_id,
                    "SMS sent"
                );
                NotificationOutcome {
                    sent: true,
                    message_id: delivery.message_id,
                    error: None,
                }
            }
            Ok(delivery) => {
                warn!(
                    template = kind.as_str(),
                    phone = %mask_phone(phone),
                    error = ?delivery.error,
                    "SMS not delivered"
                );
                NotificationOutcome {
                    sent: false,
                    message_id: delivery.message_id,
                    error: delivery.error.or_else(|| Some("SMS provider reported failure".to_string())),
                }
            }
            Err(e) => {
                warn!(template = kind.as_str(), phone = %mask_phone(phone), error = %e, "SMS request failed");
                NotificationOutcome {
                    sent: false,
                    message_id: None,
                    error: Some(e.to_string()),
                }
            }
        };

        get_metrics().record_sms(kind.as_str(), outcome.sent);
        outcome
    }
}

/// Template variables describing a ticket, its session and day.
///
/// Runs after the ticket is stored, so lookup failures fall back to `-`
/// placeholders instead of failing the caller.
pub async fn ticket_vars(store: &dyn TicketingStore, ticket: &Ticket) -> TemplateVars {
    let session = store.find_session(ticket.session_id).await.unwrap_or_else(|e| {
        warn!(ticket_code = %ticket.ticket_code, error = %e, "Session lookup failed for SMS");
        None
    });
    let day = match &session {
        Some(session) => store.find_day(session.day_id).await.unwrap_or_else(|e| {
            warn!(ticket_code = %ticket.ticket_code, error = %e, "Day lookup failed for SMS");
            None
        }),
        None => None,
    };

    let mut vars = TemplateVars::new();
    vars.insert("name".to_string(), ticket.purchaser_name.clone());
    vars.insert("ticket_code".to_string(), ticket.ticket_code.clone());
    vars.insert("ticket_type".to_string(), ticket.ticket_type.to_string());
    vars.insert("quantity".to_string(), ticket.quantity.to_string());
    vars.insert("amount".to_string(), format_amount(ticket.total_amount));
    vars.insert(
        "session".to_string(),
        session.map(|s| s.name).unwrap_or_else(|| "-".to_string()),
    );
    vars.insert(
        "day".to_string(),
        day.map(|d| format!("{} ({})", d.name, d.date.format("%d/%m/%Y")))
            .unwrap_or_else(|| "-".to_string()),
    );
    vars
}
