use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::{ChildDetails, StudentDetails, TicketType};

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Created, waiting for payment confirmation.
    Pending,
    /// Paid and admissible.
    Active,
    /// Scanned at the gate. Terminal.
    Used,
    /// Payment was refused or errored. Terminal.
    Failed,
}

impl TicketStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TicketStatus::Used | TicketStatus::Failed)
    }
}

/// Summary of the ticket's payment. Authoritative over individual
/// transaction rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    /// Issued free of charge; admissible like `Paid`.
    Complimentary,
}

impl PaymentStatus {
    /// Returns true if the ticket counts as paid at the gate.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Complimentary)
    }
}

/// A fallback the importer substituted for a missing or unrecognised value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDefault {
    pub field: String,
    pub raw: String,
    pub applied: String,
}

impl AppliedDefault {
    pub fn new(field: impl Into<String>, raw: impl Into<String>, applied: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            raw: raw.into(),
            applied: applied.into(),
        }
    }
}

/// Compact record of a validation step kept in the ticket's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStep {
    pub step: String,
    pub passed: bool,
    pub message: String,
}

/// Where the ticket came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketSource {
    Purchase {
        submitted_at: DateTime<Utc>,
    },
    Import {
        row_number: usize,
        imported_at: DateTime<Utc>,
        raw_payment_method: String,
        applied_defaults: Vec<AppliedDefault>,
    },
}

/// Link from a duplicate import to the purchaser's first ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLink {
    pub original_ticket_id: Uuid,
    pub original_ticket_code: String,
}

/// Versioned audit data stored in the ticket's `metadata` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub schema_version: u32,
    pub source: TicketSource,
    pub day_id: Uuid,
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub student: Option<StudentDetails>,
    #[serde(default)]
    pub child: Option<ChildDetails>,
    #[serde(default)]
    pub duplicate_of: Option<DuplicateLink>,
    #[serde(default)]
    pub validation: Vec<AuditStep>,
}

impl TicketMetadata {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(source: TicketSource, day_id: Uuid) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            source,
            day_id,
            unit_price: None,
            student: None,
            child: None,
            duplicate_of: None,
            validation: Vec::new(),
        }
    }

    pub fn with_unit_price(mut self, unit_price: Option<Decimal>) -> Self {
        self.unit_price = unit_price;
        self
    }

    pub fn with_student(mut self, student: Option<StudentDetails>) -> Self {
        self.student = student;
        self
    }

    pub fn with_child(mut self, child: Option<ChildDetails>) -> Self {
        self.child = child;
        self
    }

    pub fn with_duplicate_of(mut self, link: Option<DuplicateLink>) -> Self {
        self.duplicate_of = link;
        self
    }

    pub fn with_validation(mut self, steps: Vec<AuditStep>) -> Self {
        self.validation = steps;
        self
    }
}

/// A sold or imported ticket. The unit of entry at the gate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_code: String,
    pub session_id: Uuid,
    pub purchaser_name: String,
    /// Normalised `255XXXXXXXXX` form.
    pub purchaser_phone: String,
    pub ticket_type: TicketType,
    pub total_amount: Decimal,
    pub quantity: i32,
    pub status: TicketStatus,
    pub payment_status: PaymentStatus,
    pub payment_method_id: String,
    pub is_imported: bool,
    pub metadata: Json<TicketMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticket_code: String,
        session_id: Uuid,
        purchaser_name: String,
        purchaser_phone: String,
        ticket_type: TicketType,
        total_amount: Decimal,
        quantity: i32,
        payment_method_id: String,
        metadata: TicketMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticket_code,
            session_id,
            purchaser_name,
            purchaser_phone,
            ticket_type,
            total_amount,
            quantity,
            status: TicketStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method_id,
            is_imported: false,
            metadata: Json(metadata),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the ticket as an already-paid historical import.
    pub fn imported(mut self) -> Self {
        self.is_imported = true;
        self.status = TicketStatus::Active;
        self.payment_status = PaymentStatus::Paid;
        self
    }

    pub fn is_duplicate(&self) -> bool {
        self.metadata.duplicate_of.is_some()
    }

    pub fn original_ticket_id(&self) -> Option<Uuid> {
        self.metadata.duplicate_of.as_ref().map(|link| link.original_ticket_id)
    }

    pub fn is_used(&self) -> bool {
        self.status == TicketStatus::Used
    }

    /// External reference sent to the payment gateway for this ticket.
    pub fn payment_reference(&self) -> String {
        format!("TICKET-{}", self.ticket_code)
    }
}
