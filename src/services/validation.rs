use crate::error::Result;
use crate::models::{
    AppliedDefault, AuditStep, EventDay, EventSession, InstitutionType, PaymentMethod,
    StudentDetails, TicketPrice, TicketType,
};
use crate::observability::get_metrics;
use crate::repositories::TicketingStore;
use crate::utils::{is_valid_phone, normalize_phone};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const PURCHASER_VALIDATION: &str = "PURCHASER_VALIDATION";
pub const QUANTITY_VALIDATION: &str = "QUANTITY_VALIDATION";
pub const DAY_VALIDATION: &str = "DAY_VALIDATION";
pub const SESSION_VALIDATION: &str = "SESSION_VALIDATION";
pub const PRICE_VALIDATION: &str = "PRICE_VALIDATION";
pub const PAYMENT_METHOD_VALIDATION: &str = "PAYMENT_METHOD_VALIDATION";
pub const STUDENT_VALIDATION: &str = "STUDENT_VALIDATION";
pub const AMOUNT_VALIDATION: &str = "AMOUNT_VALIDATION";

/// Largest accepted difference between the quoted total and price x quantity.
pub fn amount_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// How strictly a request is checked.
///
/// Interactive purchases are strict. Backfilled historical data is
/// permissive: incomplete fields degrade to defaults instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    Strict,
    Permissive,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Permissive => "permissive",
        }
    }

    fn is_strict(&self) -> bool {
        matches!(self, ValidationMode::Strict)
    }
}

/// Student fields as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInput {
    pub student_id: String,
    pub institution: Option<String>,
    pub institution_name: Option<String>,
}

/// A purchase or import request before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub purchaser_name: String,
    /// Raw phone as typed; normalised during validation.
    pub purchaser_phone: String,
    pub day_id: Uuid,
    pub session_id: Uuid,
    pub ticket_type: TicketType,
    pub quantity: i32,
    pub total_amount: Option<Decimal>,
    pub payment_method_id: Option<String>,
    pub student: Option<StudentInput>,
    pub parent_name: Option<String>,
}

/// One check's result with diagnostic detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub step: String,
    pub passed: bool,
    pub message: String,
    pub details: serde_json::Value,
}

impl ValidationStep {
    pub fn pass(step: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            step: step.to_string(),
            passed: true,
            message: message.into(),
            details,
        }
    }

    /// A pass that only holds because the mode is permissive.
    pub fn soft_pass(step: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        let mut details = details;
        if let Some(object) = details.as_object_mut() {
            object.insert("soft".to_string(), json!(true));
        } else {
            details = json!({ "soft": true });
        }
        Self::pass(step, message, details)
    }

    pub fn fail(step: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            step: step.to_string(),
            passed: false,
            message: message.into(),
            details,
        }
    }

    pub fn is_soft(&self) -> bool {
        self.details.get("soft").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn to_audit(&self) -> AuditStep {
        AuditStep {
            step: self.step.clone(),
            passed: self.passed,
            message: self.message.clone(),
        }
    }
}

/// Everything a ticket needs once the request is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEntities {
    pub day: EventDay,
    pub session: EventSession,
    pub price: Option<TicketPrice>,
    pub payment_method: PaymentMethod,
    pub purchaser_name: String,
    pub purchaser_phone: String,
    pub ticket_type: TicketType,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub total_amount: Decimal,
    pub student: Option<StudentDetails>,
    pub parent_name: Option<String>,
    pub applied_defaults: Vec<AppliedDefault>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub failed_step: Option<String>,
    pub steps: Vec<ValidationStep>,
    pub resolved: Option<ResolvedEntities>,
}

impl ValidationOutcome {
    fn rejected(steps: Vec<ValidationStep>) -> Self {
        let failed = steps.iter().rev().find(|s| !s.passed);
        Self {
            success: false,
            error: failed.map(|s| s.message.clone()),
            failed_step: failed.map(|s| s.step.clone()),
            steps,
            resolved: None,
        }
    }

    fn accepted(steps: Vec<ValidationStep>, resolved: ResolvedEntities) -> Self {
        Self {
            success: true,
            error: None,
            failed_step: None,
            steps,
            resolved: Some(resolved),
        }
    }

    /// Compact form stored in the ticket's audit trail.
    pub fn audit_trail(&self) -> Vec<AuditStep> {
        self.steps.iter().map(ValidationStep::to_audit).collect()
    }
}

/// Runs the ordered checks shared by the purchase and import flows.
pub struct ValidationEngine {
    store: Arc<dyn TicketingStore>,
    max_quantity: i32,
}

impl ValidationEngine {
    pub fn new(store: Arc<dyn TicketingStore>, max_quantity: i32) -> Self {
        Self { store, max_quantity }
    }

    /// Validates a request. Rejections are returned as a value with
    /// `success = false`; `Err` only carries store failures.
    pub async fn validate(&self, request: &TicketRequest, mode: ValidationMode) -> Result<ValidationOutcome> {
        let outcome = self.run(request, mode).await?;

        get_metrics().record_validation(mode.as_str(), outcome.success, outcome.failed_step.as_deref());
        if outcome.success {
            debug!(mode = mode.as_str(), steps = outcome.steps.len(), "Validation passed");
        } else {
            info!(
                mode = mode.as_str(),
                failed_step = ?outcome.failed_step,
                error = ?outcome.error,
                "Validation rejected request"
            );
        }
        Ok(outcome)
    }

    async fn run(&self, request: &TicketRequest, mode: ValidationMode) -> Result<ValidationOutcome> {
        let mut steps = Vec::new();
        let mut applied_defaults = Vec::new();

        macro_rules! check {
            ($step:expr) => {{
                let step: ValidationStep = $step;
                let passed = step.passed;
                steps.push(step);
                if !passed {
                    return Ok(ValidationOutcome::rejected(steps));
                }
            }};
        }

        // Purchaser
        let purchaser_name = request.purchaser_name.trim().to_string();
        let purchaser_phone = normalize_phone(&request.purchaser_phone);
        check!(self.check_purchaser(&purchaser_name, &purchaser_phone, mode));

        // Quantity
        check!(self.check_quantity(request.quantity));

        // Day
        let day = self.store.find_day(request.day_id).await?;
        check!(check_day(request.day_id, day.as_ref(), mode));
        let Some(day) = day else {
            return Ok(ValidationOutcome::rejected(steps));
        };

        // Session
        let session = self.store.find_session(request.session_id).await?;
        check!(check_session(request.session_id, session.as_ref(), &day));
        let Some(session) = session else {
            return Ok(ValidationOutcome::rejected(steps));
        };

        // Price
        let price = self.store.find_active_price(request.ticket_type, day.id).await?;
        check!(check_price(request.ticket_type, price.as_ref(), mode));
        let unit_price = price.as_ref().map(|p| p.price);

        // Payment method
        let (method_step, payment_method) = self.check_payment_method(request.payment_method_id.as_deref(), mode).await?;
        check!(method_step);
        let Some(payment_method) = payment_method else {
            return Ok(ValidationOutcome::rejected(steps));
        };
        if !request
            .payment_method_id
            .as_deref()
            .map_or(false, |raw| raw.trim().eq_ignore_ascii_case(&payment_method.id))
        {
            applied_defaults.push(AppliedDefault::new(
                "payment_method",
                request.payment_method_id.clone().unwrap_or_default(),
                payment_method.id.clone(),
            ));
        }

        // Student fields
        let (student_step, student) = check_student(request.ticket_type, request.student.as_ref());
        check!(student_step);

        // Amount
        let (amount_step, total_amount) = check_amount(request.total_amount, unit_price, request.quantity, mode);
        check!(amount_step);
        let Some(total_amount) = total_amount else {
            return Ok(ValidationOutcome::rejected(steps));
        };
        if request.total_amount.is_none() {
            applied_defaults.push(AppliedDefault::new("total_amount", "", total_amount.to_string()));
        }

        let resolved = ResolvedEntities {
            day,
            session,
            price,
            payment_method,
            purchaser_name,
            purchaser_phone,
            ticket_type: request.ticket_type,
            quantity: request.quantity,
            unit_price,
            total_amount,
            student,
            parent_name: request
                .parent_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            applied_defaults,
        };

        Ok(ValidationOutcome::accepted(steps, resolved))
    }

    fn check_purchaser(&self, name: &str, phone: &str, mode: ValidationMode) -> ValidationStep {
        if name.is_empty() {
            return ValidationStep::fail(PURCHASER_VALIDATION, "Purchaser name is required", json!({}));
        }
        if phone.is_empty() {
            return ValidationStep::fail(PURCHASER_VALIDATION, "Purchaser phone is required", json!({}));
        }
        if is_valid_phone(phone) {
            return ValidationStep::pass(PURCHASER_VALIDATION, "Purchaser details valid", json!({ "phone": phone }));
        }

        if mode.is_strict() {
            ValidationStep::fail(
                PURCHASER_VALIDATION,
                format!("Invalid phone number: {}", phone),
                json!({ "phone": phone }),
            )
        } else {
            ValidationStep::soft_pass(
                PURCHASER_VALIDATION,
                "Phone number kept as given",
                json!({ "phone": phone }),
            )
        }
    }

    fn check_quantity(&self, quantity: i32) -> ValidationStep {
        if quantity < 1 {
            return ValidationStep::fail(
                QUANTITY_VALIDATION,
                "Quantity must be at least 1",
                json!({ "quantity": quantity }),
            );
        }
        if quantity > self.max_quantity {
            return ValidationStep::fail(
                QUANTITY_VALIDATION,
                format!("Quantity cannot exceed {}", self.max_quantity),
                json!({ "quantity": quantity, "max_quantity": self.max_quantity }),
            );
        }
        ValidationStep::pass(QUANTITY_VALIDATION, "Quantity valid", json!({ "quantity": quantity }))
    }

    async fn check_payment_method(
        &self,
        requested: Option<&str>,
        mode: ValidationMode,
    ) -> Result<(ValidationStep, Option<PaymentMethod>)> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());

        let found = match requested {
            Some(id) => self.store.find_payment_method(id).await?,
            None => None,
        };

        let problem = match (&requested, &found) {
            (None, _) => "Payment method is required".to_string(),
            (Some(id), None) => format!("Payment method '{}' not found", id),
            (Some(id), Some(method)) if !method.is_active => format!("Payment method '{}' is not active", id),
            (_, Some(method)) => {
                let step = ValidationStep::pass(
                    PAYMENT_METHOD_VALIDATION,
                    format!("Payment method {} accepted", method.name),
                    json!({ "payment_method_id": method.id, "provider": method.provider }),
                );
                return Ok((step, Some(method.clone())));
            }
        };

        if mode.is_strict() {
            let step = ValidationStep::fail(
                PAYMENT_METHOD_VALIDATION,
                problem,
                json!({ "payment_method_id": requested }),
            );
            return Ok((step, None));
        }

        let cash = match self.store.find_payment_method(PaymentMethod::CASH).await? {
            Some(method) => method,
            None => PaymentMethod::cash(),
        };
        let step = ValidationStep::soft_pass(
            PAYMENT_METHOD_VALIDATION,
            format!("{}; defaulted to {}", problem, PaymentMethod::CASH),
            json!({ "payment_method_id": requested, "applied": cash.id }),
        );
        Ok((step, Some(cash)))
    }
}

fn check_day(day_id: Uuid, day: Option<&EventDay>, mode: ValidationMode) -> ValidationStep {
    match day {
        None => ValidationStep::fail(DAY_VALIDATION, "Event day not found", json!({ "day_id": day_id })),
        Some(day) if day.is_active => ValidationStep::pass(
            DAY_VALIDATION,
            format!("Event day {} is active", day.name),
            json!({ "day_id": day.id, "date": day.date }),
        ),
        Some(day) if mode.is_strict() => ValidationStep::fail(
            DAY_VALIDATION,
            format!("Event day {} is not active", day.name),
            json!({ "day_id": day.id, "date": day.date }),
        ),
        Some(day) => ValidationStep::soft_pass(
            DAY_VALIDATION,
            format!("Event day {} is not active; accepted for import", day.name),
            json!({ "day_id": day.id, "date": day.date }),
        ),
    }
}

fn check_session(session_id: Uuid, session: Option<&EventSession>, day: &EventDay) -> ValidationStep {
    match session {
        None => ValidationStep::fail(
            SESSION_VALIDATION,
            "Event session not found",
            json!({ "session_id": session_id }),
        ),
        Some(session) if !session.belongs_to(day.id) => ValidationStep::fail(
            SESSION_VALIDATION,
            format!("Session {} does not belong to {}", session.name, day.name),
            json!({ "session_id": session.id, "session_day_id": session.day_id, "day_id": day.id }),
        ),
        Some(session) => ValidationStep::pass(
            SESSION_VALIDATION,
            format!("Session {} belongs to {}", session.name, day.name),
            json!({
                "session_id": session.id,
                "start_time": session.start_time,
                "end_time": session.end_time,
            }),
        ),
    }
}

fn check_price(ticket_type: TicketType, price: Option<&TicketPrice>, mode: ValidationMode) -> ValidationStep {
    match price {
        Some(price) => ValidationStep::pass(
            PRICE_VALIDATION,
            format!("{} price is {}", ticket_type, price.price),
            json!({ "price_id": price.id, "price": price.price, "day_specific": price.day_id.is_some() }),
        ),
        None if mode.is_strict() => ValidationStep::fail(
            PRICE_VALIDATION,
            format!("No active price for {} tickets", ticket_type),
            json!({ "ticket_type": ticket_type }),
        ),
        None => ValidationStep::soft_pass(
            PRICE_VALIDATION,
            format!("No active price for {} tickets; using recorded amount", ticket_type),
            json!({ "ticket_type": ticket_type }),
        ),
    }
}

/// Student fields are mandatory in every mode.
fn check_student(ticket_type: TicketType, input: Option<&StudentInput>) -> (ValidationStep, Option<StudentDetails>) {
    if ticket_type != TicketType::Student {
        let step = ValidationStep::pass(
            STUDENT_VALIDATION,
            format!("Not required for {} tickets", ticket_type),
            json!({ "skipped": true }),
        );
        return (step, None);
    }

    let Some(input) = input else {
        return (
            ValidationStep::fail(STUDENT_VALIDATION, "Student details are required", json!({})),
            None,
        );
    };

    let student_id = input.student_id.trim();
    if student_id.is_empty() {
        return (
            ValidationStep::fail(STUDENT_VALIDATION, "Student ID is required", json!({})),
            None,
        );
    }

    let Some(institution_type) = input.institution.as_deref().and_then(InstitutionType::parse_loose) else {
        return (
            ValidationStep::fail(
                STUDENT_VALIDATION,
                "Institution is required",
                json!({ "student_id": student_id }),
            ),
            None,
        );
    };

    let institution_name = input
        .institution_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if institution_type == InstitutionType::Other && institution_name.is_none() {
        return (
            ValidationStep::fail(
                STUDENT_VALIDATION,
                "Institution name is required when institution is OTHER",
                json!({ "student_id": student_id, "institution_type": institution_type }),
            ),
            None,
        );
    }

    let details = StudentDetails {
        student_id: student_id.to_string(),
        institution_type: Some(institution_type),
        institution_name,
    };
    let step = ValidationStep::pass(
        STUDENT_VALIDATION,
        "Student details complete",
        json!({ "student_id": details.student_id, "institution_type": institution_type }),
    );
    (step, Some(details))
}

fn expected_total(unit: Decimal, quantity: i32) -> Option<Decimal> {
    unit.checked_mul(Decimal::from(quantity))
}

fn overflow_step(total: Option<Decimal>) -> (ValidationStep, Option<Decimal>) {
    (
        ValidationStep::fail(AMOUNT_VALIDATION, "Amount is out of range", json!({ "total": total })),
        None,
    )
}

fn check_amount(
    total: Option<Decimal>,
    unit_price: Option<Decimal>,
    quantity: i32,
    mode: ValidationMode,
) -> (ValidationStep, Option<Decimal>) {
    if let Some(total) = total {
        if total <= Decimal::ZERO {
            return (
                ValidationStep::fail(
                    AMOUNT_VALIDATION,
                    "Amount must be greater than zero",
                    json!({ "total": total }),
                ),
                None,
            );
        }
    }

    match (total, unit_price) {
        (Some(total), Some(unit)) => {
            let Some(expected) = expected_total(unit, quantity) else {
                return overflow_step(Some(total));
            };
            let Some(difference) = total.checked_sub(expected).map(|d| d.abs()) else {
                return overflow_step(Some(total));
            };
            let details = json!({ "total": total, "expected": expected, "difference": difference });

            if difference <= amount_tolerance() {
                (ValidationStep::pass(AMOUNT_VALIDATION, "Amount matches price", details), Some(total))
            } else if mode.is_strict() {
                (
                    ValidationStep::fail(
                        AMOUNT_VALIDATION,
                        format!("Amount {} does not match expected {}", total, expected),
                        details,
                    ),
                    None,
                )
            } else {
                (
                    ValidationStep::soft_pass(
                        AMOUNT_VALIDATION,
                        format!("Recorded amount {} differs from expected {}", total, expected),
                        details,
                    ),
                    Some(total),
                )
            }
        }
        (None, Some(unit)) if !mode.is_strict() => {
            let Some(expected) = expected_total(unit, quantity) else {
                return overflow_step(None);
            };
            (
                ValidationStep::soft_pass(
                    AMOUNT_VALIDATION,
                    "Amount missing; computed from price",
                    json!({ "expected": expected }),
                ),
                Some(expected),
            )
        }
        (None, _) if mode.is_strict() => (
            ValidationStep::fail(AMOUNT_VALIDATION, "Total amount is required", json!({})),
            None,
        ),
        (Some(total), None) => (
            ValidationStep::soft_pass(
                AMOUNT_VALIDATION,
                "Price unknown; recorded amount kept",
                json!({ "total": total }),
            ),
            Some(total),
        ),
        (None, _) => (
            ValidationStep::soft_pass(
                AMOUNT_VALIDATION,
                "Amount and price unknown; recorded as zero",
                json!({}),
            ),
            Some(Decimal::ZERO),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_within_tolerance() {
        let (step, total) = check_amount(Some(dec!(30000.01)), Some(dec!(10000)), 3, ValidationMode::Strict);
        assert!(step.passed);
        assert_eq!(total, Some(dec!(30000.01)));
    }

    #[test]
    fn test_amount_off_by_one_fails_strict() {
        let (step, total) = check_amount(Some(dec!(30001.00)), Some(dec!(10000)), 3, ValidationMode::Strict);
        assert!(!step.passed);
        assert_eq!(step.step, AMOUNT_VALIDATION);
        assert_eq!(total, None);
    }

    #[test]
    fn test_amount_mismatch_is_soft_when_permissive() {
        let (step, total) = check_amount(Some(dec!(25000)), Some(dec!(10000)), 3, ValidationMode::Permissive);
        assert!(step.passed);
        assert!(step.is_soft());
        assert_eq!(total, Some(dec!(25000)));
    }

    #[test]
    fn test_missing_amount_is_computed_when_permissive() {
        let (step, total) = check_amount(None, Some(dec!(5000)), 2, ValidationMode::Permissive);
        assert!(step.passed);
        assert_eq!(total, Some(dec!(10000)));
    }

    #[test]
    fn test_non_positive_totals_fail_in_both_modes() {
        for mode in [ValidationMode::Strict, ValidationMode::Permissive] {
            let (step, total) = check_amount(Some(dec!(-10000)), Some(dec!(10000)), 1, mode);
            assert!(!step.passed);
            assert_eq!(total, None);

            let (step, _) = check_amount(Some(Decimal::ZERO), None, 1, mode);
            assert!(!step.passed);
        }
    }

    #[test]
    fn test_extreme_totals_fail_without_panicking() {
        let (step, total) = check_amount(Some(Decimal::MAX), Some(dec!(-10000)), 1, ValidationMode::Strict);
        assert!(!step.passed);
        assert_eq!(total, None);

        let (step, total) = check_amount(None, Some(Decimal::MAX), 3, ValidationMode::Permissive);
        assert!(!step.passed);
        assert_eq!(step.message, "Amount is out of range");
        assert_eq!(total, None);
    }

    #[test]
    fn test_student_other_requires_name() {
        let input = StudentInput {
            student_id: "UDSM-2024-001".to_string(),
            institution: Some("other".to_string()),
            institution_name: Some("  ".to_string()),
        };
        let (step, details) = check_student(TicketType::Student, Some(&input));
        assert!(!step.passed);
        assert!(details.is_none());
    }

    #[test]
    fn test_student_check_skipped_for_adults() {
        let (step, details) = check_student(TicketType::Adult, None);
        assert!(step.passed);
        assert!(details.is_none());
    }

    #[test]
    fn test_student_requires_id_and_institution() {
        let missing_id = StudentInput {
            student_id: " ".to_string(),
            institution: Some("university".to_string()),
            institution_name: None,
        };
        assert!(!check_student(TicketType::Student, Some(&missing_id)).0.passed);

        let missing_institution = StudentInput {
            student_id: "S-1".to_string(),
            institution: None,
            institution_name: None,
        };
        assert!(!check_student(TicketType::Student, Some(&missing_institution)).0.passed);

        let complete = StudentInput {
            student_id: "S-1".to_string(),
            institution: Some("University".to_string()),
            institution_name: None,
        };
        let (step, details) = check_student(TicketType::Student, Some(&complete));
        assert!(step.passed);
        assert_eq!(details.unwrap().institution_type, Some(InstitutionType::University));
    }

    #[test]
    fn test_soft_pass_is_marked() {
        let step = ValidationStep::soft_pass(DAY_VALIDATION, "inactive", json!({ "day_id": 1 }));
        assert!(step.passed);
        assert!(step.is_soft());
        assert!(!ValidationStep::pass(DAY_VALIDATION, "ok", json!({})).is_soft());
    }
}
