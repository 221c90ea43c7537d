use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Attendee, PaymentStatus, PaymentTransaction, Ticket, TicketStatus, TicketType,
};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    /// Flattens `validator` field errors, nested structs included.
    pub fn from_errors(errors: &validator::ValidationErrors) -> Vec<Self> {
        let mut details = Vec::new();
        collect_errors("", errors, &mut details);
        details
    }
}

fn collect_errors(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<ValidationErrorDetail>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            validator::ValidationErrorsKind::Field(list) => {
                for error in list {
                    out.push(ValidationErrorDetail {
                        field: path.clone(),
                        message: error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", path)),
                    });
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => collect_errors(&path, nested, out),
            validator::ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_errors(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

/// Ticket detail DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub ticket_code: String,
    pub session_id: Uuid,
    pub purchaser_name: String,
    pub ticket_type: TicketType,
    pub quantity: i32,
    pub total_amount: Decimal,
    pub status: TicketStatus,
    pub payment_status: PaymentStatus,
    pub payment_method_id: String,
    pub is_imported: bool,
    pub original_ticket_id: Option<Uuid>,
    pub attendees: Vec<Attendee>,
    pub transactions: Vec<PaymentTransaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketResponse {
    pub fn new(ticket: Ticket, attendees: Vec<Attendee>, transactions: Vec<PaymentTransaction>) -> Self {
        Self {
            original_ticket_id: ticket.original_ticket_id(),
            id: ticket.id,
            ticket_code: ticket.ticket_code,
            session_id: ticket.session_id,
            purchaser_name: ticket.purchaser_name,
            ticket_type: ticket.ticket_type,
            quantity: ticket.quantity,
            total_amount: ticket.total_amount,
            status: ticket.status,
            payment_status: ticket.payment_status,
            payment_method_id: ticket.payment_method_id,
            is_imported: ticket.is_imported,
            attendees,
            transactions,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}
