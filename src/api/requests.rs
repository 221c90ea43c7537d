use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::TicketType;
use crate::services::validation::{StudentInput, TicketRequest};

/// Body of `POST /purchases` and `POST /purchases/validate`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseRequest {
    #[validate(length(min = 1, max = 200, message = "purchaser_name cannot be empty"))]
    pub purchaser_name: String,
    #[validate(length(min = 9, max = 20, message = "purchaser_phone must be a phone number"))]
    pub purchaser_phone: String,
    pub day_id: Uuid,
    pub session_id: Uuid,
    pub ticket_type: TicketType,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    pub total_amount: Option<Decimal>,
    pub payment_method_id: Option<String>,
    #[validate]
    pub student: Option<StudentPayload>,
    pub parent_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudentPayload {
    #[validate(length(min = 1, message = "student_id cannot be empty"))]
    pub student_id: String,
    pub institution: Option<String>,
    pub institution_name: Option<String>,
}

impl From<PurchaseRequest> for TicketRequest {
    fn from(request: PurchaseRequest) -> Self {
        Self {
            purchaser_name: request.purchaser_name,
            purchaser_phone: request.purchaser_phone,
            day_id: request.day_id,
            session_id: request.session_id,
            ticket_type: request.ticket_type,
            quantity: request.quantity,
            total_amount: request.total_amount,
            payment_method_id: request.payment_method_id,
            student: request.student.map(|s| StudentInput {
                student_id: s.student_id,
                institution: s.institution,
                institution_name: s.institution_name,
            }),
            parent_name: request.parent_name,
        }
    }
}

/// Body of `POST /tickets/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyTicketRequest {
    #[validate(length(min = 1, message = "code cannot be empty"))]
    pub code: String,
    #[serde(default = "default_true")]
    pub require_student_id_check: bool,
}

/// Body of the CSV import endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CsvUploadRequest {
    #[validate(length(min = 1, message = "csv cannot be empty"))]
    pub csv: String,
}

fn default_true() -> bool {
    true
}
