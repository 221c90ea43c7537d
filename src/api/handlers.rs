use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use validator::Validate;

use crate::api::requests::{CsvUploadRequest, PurchaseRequest, VerifyTicketRequest};
use crate::api::responses::{ApiResponse, ErrorResponse, TicketResponse, ValidationErrorDetail};
use crate::error::AppError;
use crate::observability::{get_metrics, AggregatedHealth, LatencyTimer};
use crate::services::importer::{parse_csv, CsvImportReport, CsvParseReport};
use crate::services::payment::{PaymentStatusView, PaymentVerification};
use crate::services::purchase::PurchaseResult;
use crate::services::validation::{TicketRequest, ValidationOutcome};
use crate::services::verifier::VerificationResult;

use super::routes::AppState;

type ErrorReply = (StatusCode, Json<ApiResponse<()>>);
type HandlerResult<T> = Result<Json<ApiResponse<T>>, ErrorReply>;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error. Please try again later.";

/// Maps a service error onto the response envelope.
///
/// System failures are logged with `severity = "critical"` and their detail
/// is never returned to the caller.
fn error_reply(operation: &str, error: AppError) -> ErrorReply {
    let status = match &error {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::PaymentGateway(_) | AppError::Sms(_) => StatusCode::BAD_GATEWAY,
        AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if error.is_system() {
        tracing::error!(operation, error = %error, severity = "critical", "Request failed");
        return (
            status,
            Json(ApiResponse::<()>::error(ErrorResponse::new(
                "INTERNAL_ERROR",
                INTERNAL_ERROR_MESSAGE,
            ))),
        );
    }

    tracing::warn!(operation, error = %error, "Request rejected");
    let code = error.code();
    let message = match error {
        AppError::Validation(m)
        | AppError::NotFound(m)
        | AppError::Conflict(m)
        | AppError::PaymentGateway(m)
        | AppError::Sms(m) => m,
        other => other.to_string(),
    };
    (status, Json(ApiResponse::<()>::error(ErrorResponse::new(code, message))))
}

fn check_request<T: Validate>(request: &T) -> Result<(), ErrorReply> {
    request.validate().map_err(|errors| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
                    .with_details(ValidationErrorDetail::from_errors(&errors)),
            )),
        )
    })
}

/// Records request count and latency per matched route.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<AggregatedHealth>> {
    Json(ApiResponse::success(state.health_checker.check_all().await))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics not enabled").into_response(),
    }
}

// ============================================================================
// Purchase Handlers
// ============================================================================

/// Validate, create and submit payment for a ticket.
///
/// Business rejections still answer 200 with `success = false` inside the
/// result so the client can show the failing step.
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseResult>>), ErrorReply> {
    check_request(&request)?;

    let ticket_request: TicketRequest = request.into();
    let result = state
        .purchases
        .purchase(&ticket_request)
        .await
        .map_err(|e| error_reply("create_purchase", e))?;

    let status = if result.ticket.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(result))))
}

/// Dry run of the purchase checks.
pub async fn validate_purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> HandlerResult<ValidationOutcome> {
    check_request(&request)?;

    let ticket_request: TicketRequest = request.into();
    let outcome = state
        .purchases
        .validate(&ticket_request)
        .await
        .map_err(|e| error_reply("validate_purchase", e))?;
    Ok(Json(ApiResponse::success(outcome)))
}

// ============================================================================
// Ticket Handlers
// ============================================================================

/// Get ticket by code.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> HandlerResult<TicketResponse> {
    let code = code.trim().to_uppercase();
    let ticket = state
        .store
        .find_ticket_by_code(&code)
        .await
        .map_err(|e| error_reply("get_ticket", e))?
        .ok_or_else(|| {
            error_reply("get_ticket", AppError::NotFound(format!("Ticket {} not found", code)))
        })?;

    let attendees = state
        .store
        .find_attendees(ticket.id, ticket.ticket_type)
        .await
        .map_err(|e| error_reply("get_ticket", e))?;
    let transactions = state
        .store
        .find_transactions_by_ticket(ticket.id)
        .await
        .map_err(|e| error_reply("get_ticket", e))?;

    Ok(Json(ApiResponse::success(TicketResponse::new(ticket, attendees, transactions))))
}

/// Gate scan.
pub async fn verify_ticket(
    State(state): State<AppState>,
    Json(request): Json<VerifyTicketRequest>,
) -> HandlerResult<VerificationResult> {
    check_request(&request)?;

    let result = state
        .verifier
        .verify_ticket(&request.code, request.require_student_id_check)
        .await
        .map_err(|e| error_reply("verify_ticket", e))?;
    Ok(Json(ApiResponse::success(result)))
}

// ============================================================================
// Payment Handlers
// ============================================================================

/// Reconcile a transaction with the gateway.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> HandlerResult<PaymentVerification> {
    let verification = state
        .payments
        .verify_payment(&external_id)
        .await
        .map_err(|e| error_reply("verify_payment", e))?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> HandlerResult<PaymentStatusView> {
    let view = state
        .payments
        .check_payment_status(&external_id)
        .await
        .map_err(|e| error_reply("payment_status", e))?;
    Ok(Json(ApiResponse::success(view)))
}

// ============================================================================
// Import Handlers
// ============================================================================

/// Parse an upload without importing it.
pub async fn preview_import(Json(request): Json<CsvUploadRequest>) -> HandlerResult<CsvParseReport> {
    check_request(&request)?;
    Ok(Json(ApiResponse::success(parse_csv(&request.csv))))
}

/// Import every parsable row of an upload.
pub async fn import_tickets(
    State(state): State<AppState>,
    Json(request): Json<CsvUploadRequest>,
) -> HandlerResult<CsvImportReport> {
    check_request(&request)?;
    let report = state.importer.import_csv(&request.csv).await;
    Ok(Json(ApiResponse::success(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_errors_are_masked() {
        let (status, Json(body)) = error_reply("test", AppError::Internal(anyhow::anyhow!("pool exhausted")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = body.error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert_eq!(error.message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_business_errors_keep_their_message() {
        let (status, Json(body)) = error_reply("test", AppError::NotFound("Transaction X not found".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.unwrap().message, "Transaction X not found");

        let (status, Json(body)) = error_reply("test", AppError::PaymentGateway("timeout".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error.unwrap().code, "PAYMENT_GATEWAY_ERROR");
    }

    #[test]
    fn test_reply_code_comes_from_the_error() {
        for error in [
            AppError::Validation("bad".into()),
            AppError::Conflict("taken".into()),
            AppError::Sms("down".into()),
        ] {
            let expected = error.code();
            let (_, Json(body)) = error_reply("test", error);
            assert_eq!(body.error.unwrap().code, expected);
        }
    }
}
