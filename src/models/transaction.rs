use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of a gateway interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Gateway accepted the request; waiting for the payer's PIN.
    Pending,
    Completed,
    /// Gateway refused the request.
    Failed,
    /// The request never got a usable answer.
    Error,
    Cancelled,
    /// Legacy gateway value, equivalent to `Completed`.
    Success,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Error => "ERROR",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Success => "SUCCESS",
        }
    }

    /// Returns true once money has moved.
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Success)
    }

    /// Returns true if the row can no longer change.
    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Maps a gateway verification status string.
    pub fn from_gateway(status: &str) -> Option<Self> {
        match status.trim().to_uppercase().as_str() {
            "PENDING" | "PROCESSING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "SUCCESS" | "SUCCESSFUL" => Some(TransactionStatus::Success),
            "FAILED" | "FAILURE" | "REJECTED" => Some(TransactionStatus::Failed),
            "CANCELLED" | "CANCELED" => Some(TransactionStatus::Cancelled),
            "ERROR" => Some(TransactionStatus::Error),
            _ => None,
        }
    }
}

/// Append-only record of one payment gateway interaction for a ticket.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub external_id: String,
    pub provider: String,
    pub account_number: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn new(
        ticket_id: Uuid,
        external_id: String,
        provider: String,
        account_number: String,
        amount: Decimal,
        status: TransactionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            external_id,
            provider,
            account_number,
            amount,
            status,
            error_message: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending(
        ticket_id: Uuid,
        external_id: String,
        provider: String,
        account_number: String,
        amount: Decimal,
    ) -> Self {
        Self::new(ticket_id, external_id, provider, account_number, amount, TransactionStatus::Pending)
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Identifier the gateway assigned, if it returned one.
    pub fn gateway_reference(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("gateway_reference"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
