use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Category of admission. Each category has its own attendee table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    Adult,
    /// Requires student details and is checked at the gate.
    Student,
    Child,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Adult => "ADULT",
            TicketType::Student => "STUDENT",
            TicketType::Child => "CHILD",
        }
    }

    /// Name of the table holding this type's attendees.
    pub fn attendee_table(&self) -> &'static str {
        match self {
            TicketType::Adult => "adult_attendees",
            TicketType::Student => "student_attendees",
            TicketType::Child => "child_attendees",
        }
    }
}

impl std::fmt::Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price for one unit of a ticket type. Prices with a `day_id` apply only to
/// that day and take precedence over general ones.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketPrice {
    pub id: Uuid,
    pub ticket_type: TicketType,
    pub price: Decimal,
    pub day_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TicketPrice {
    pub fn new(ticket_type: TicketType, price: Decimal, day_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_type,
            price,
            day_id,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn total_for(&self, quantity: i32) -> Decimal {
        self.price * Decimal::from(quantity)
    }
}
