mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::Harness;
use serde_json::{json, Value};
use ticket_office::api::create_router;
use ticket_office::api::responses::{ApiResponse, ErrorResponse};
use tower::ServiceExt;

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn purchase_body(h: &Harness) -> Value {
    json!({
        "purchaser_name": "Amina Said",
        "purchaser_phone": "0712345678",
        "day_id": h.day_id,
        "session_id": h.evening_id,
        "ticket_type": "ADULT",
        "quantity": 2,
        "total_amount": "20000",
        "payment_method_id": "mpesa"
    })
}

#[test]
fn test_api_response_success_serialization() {
    let response: ApiResponse<String> = ApiResponse::success("test data".to_string());
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"data\":\"test data\""));
}

#[test]
fn test_api_response_error_serialization() {
    let error = ErrorResponse::new("TEST_ERROR", "Test error message");
    let response: ApiResponse<()> = ApiResponse::<()>::error(error);
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"code\":\"TEST_ERROR\""));
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let (status, body) = send(app.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "degraded");

    let (status, _) = send(app.clone(), "GET", "/live", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_purchase_then_lookup_by_code() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let (status, body) = send(app.clone(), "POST", "/purchases", Some(purchase_body(&h))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["payment"]["requires_pin_confirmation"], true);

    let code = body["data"]["ticket"]["ticket_code"].as_str().unwrap().to_string();
    let (status, body) = send(app, "GET", &format!("/tickets/{}", code.to_lowercase()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ticket_code"], code);
    assert_eq!(body["data"]["attendees"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["transactions"][0]["status"], "PENDING");
}

#[tokio::test]
async fn test_malformed_request_is_rejected_with_details() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let mut body = purchase_body(&h);
    body["purchaser_name"] = json!("");
    body["quantity"] = json!(0);

    let (status, body) = send(app, "POST", "/purchases", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"purchaser_name"));
    assert!(fields.contains(&"quantity"));
}

#[tokio::test]
async fn test_validate_endpoint_is_a_dry_run() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let mut body = purchase_body(&h);
    body["total_amount"] = json!("21000");

    let (status, body) = send(app, "POST", "/purchases/validate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], false);
    assert_eq!(body["data"]["failed_step"], "AMOUNT_VALIDATION");
    assert_eq!(h.store.ticket_count().await, 0);
}

#[tokio::test]
async fn test_unknown_ticket_and_payment_are_not_found() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let (status, body) = send(app.clone(), "GET", "/tickets/TK000000000000", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(app.clone(), "POST", "/payments/TICKET-NOPE/verify", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app, "GET", "/payments/TICKET-NOPE/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_verification_and_gate_scan() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let (_, body) = send(app.clone(), "POST", "/purchases", Some(purchase_body(&h))).await;
    let code = body["data"]["ticket"]["ticket_code"].as_str().unwrap().to_string();
    let external_id = body["data"]["payment"]["transaction"]["external_id"]
        .as_str()
        .unwrap()
        .to_string();

    h.gateway.answer_verify(Some("COMPLETED"));
    let (status, body) = send(app.clone(), "POST", &format!("/payments/{}/verify", external_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");

    let (_, body) = send(app.clone(), "GET", &format!("/payments/{}/status", external_id), None).await;
    assert_eq!(body["data"]["payment_status"], "PAID");

    let scan = json!({ "code": code });
    let (status, body) = send(app.clone(), "POST", "/tickets/verify", Some(scan.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);

    let (_, body) = send(app, "POST", "/tickets/verify", Some(scan)).await;
    assert_eq!(body["data"]["success"], false);
    assert_eq!(body["data"]["step"], "USAGE");
}

#[tokio::test]
async fn test_import_preview_and_import() {
    let h = Harness::new().await;
    let app = create_router(h.state());
    let csv = "day,session,name,phone,type,qty,amount,method\n\
               2024-12-20,Evening,Amina Said,0712345678,Adult,1,10000,cash\n\
               2024-12-20,Evening,short";

    let (status, body) = send(app.clone(), "POST", "/imports/preview", Some(json!({ "csv": csv }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["skipped_rows"], 1);
    assert_eq!(h.store.ticket_count().await, 0);

    let (status, body) = send(app, "POST", "/imports", Some(json!({ "csv": csv }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["import"]["successful"], 1);
    assert_eq!(h.store.ticket_count().await, 1);
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let h = Harness::new().await;
    let app = create_router(h.state());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
