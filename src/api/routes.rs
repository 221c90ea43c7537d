use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Settings;
use crate::gateways::{PaymentGateway, SmsSender};
use crate::notifications::NotificationService;
use crate::observability::HealthChecker;
use crate::repositories::TicketingStore;
use crate::services::{ImportService, PaymentService, PurchaseService, TicketVerifier};
use crate::utils::EventClock;

/// Tunables the services need, lifted out of [`Settings`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub currency: String,
    pub pre_entry_minutes: i64,
    pub max_quantity: i32,
    pub row_delay: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            currency: "TZS".to_string(),
            pre_entry_minutes: 120,
            max_quantity: 20,
            row_delay: Duration::from_millis(100),
        }
    }
}

impl ServiceOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            currency: settings.payment.currency.clone(),
            pre_entry_minutes: settings.event.pre_entry_minutes,
            max_quantity: settings.event.max_quantity,
            row_delay: Duration::from_millis(settings.import.row_delay_ms),
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketingStore>,
    pub purchases: Arc<PurchaseService>,
    pub payments: Arc<PaymentService>,
    pub verifier: Arc<TicketVerifier>,
    pub importer: Arc<ImportService>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    /// Wires the services over one store and one pair of gateways.
    pub fn new(
        store: Arc<dyn TicketingStore>,
        gateway: Arc<dyn PaymentGateway>,
        sms: Arc<dyn SmsSender>,
        clock: EventClock,
        options: ServiceOptions,
        health_checker: Arc<HealthChecker>,
    ) -> Self {
        let notifications = NotificationService::new(sms);
        let payments = Arc::new(PaymentService::new(
            store.clone(),
            gateway,
            notifications.clone(),
            options.currency.clone(),
        ));

        Self {
            purchases: Arc::new(PurchaseService::new(
                store.clone(),
                payments.clone(),
                notifications.clone(),
                clock.clone(),
                options.max_quantity,
            )),
            verifier: Arc::new(TicketVerifier::new(
                store.clone(),
                clock.clone(),
                options.pre_entry_minutes,
            )),
            importer: Arc::new(ImportService::new(
                store.clone(),
                notifications,
                clock,
                options.max_quantity,
                options.row_delay,
            )),
            payments,
            store,
            metrics_handle: None,
            health_checker,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Purchases
        .route("/purchases", post(handlers::create_purchase))
        .route("/purchases/validate", post(handlers::validate_purchase))
        // Tickets
        .route("/tickets/verify", post(handlers::verify_ticket))
        .route("/tickets/:code", get(handlers::get_ticket))
        // Payments
        .route("/payments/:external_id/verify", post(handlers::verify_payment))
        .route("/payments/:external_id/status", get(handlers::payment_status))
        // Imports
        .route("/imports/preview", post(handlers::preview_import))
        .route("/imports", post(handlers::import_tickets))
        .route_layer(middleware::from_fn(handlers::track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
