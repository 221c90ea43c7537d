use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the ticket office.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_validation(&self, mode: &str, success: bool, failed_step: Option<&str>) {
        counter!(
            "ticketing_validations_total",
            "mode" => mode.to_string(),
            "success" => success.to_string(),
            "failed_step" => failed_step.unwrap_or("none").to_string()
        )
        .increment(1);
    }

    pub fn record_ticket_created(&self, ticket_type: &str, imported: bool) {
        counter!("ticketing_tickets_created_total", "type" => ticket_type.to_string(), "imported" => imported.to_string()).increment(1);
    }

    pub fn record_payment_submission(&self, provider: &str, status: &str) {
        counter!("ticketing_payment_submissions_total", "provider" => provider.to_string(), "status" => status.to_string()).increment(1);
    }

    pub fn record_payment_verification(&self, status: &str) {
        counter!("ticketing_payment_verifications_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_gateway_latency(&self, operation: &str, duration_ms: f64) {
        histogram!("ticketing_gateway_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    /// `step` is the failing step tag, or `ADMITTED` for a successful scan.
    pub fn record_scan(&self, step: &str) {
        counter!("ticketing_scans_total", "outcome" => step.to_string()).increment(1);
    }

    pub fn record_import_row(&self, outcome: &str) {
        counter!("ticketing_import_rows_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_import_batch(&self, rows: u64, duration_ms: f64) {
        histogram!("ticketing_import_batch_rows").record(rows as f64);
        histogram!("ticketing_import_batch_duration_ms").record(duration_ms);
    }

    pub fn record_sms(&self, template: &str, sent: bool) {
        counter!("ticketing_sms_total", "template" => template.to_string(), "sent" => sent.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

fn describe_metrics() {
    describe_counter!("ticketing_validations_total", Unit::Count, "Validation runs by mode and outcome");
    describe_counter!("ticketing_tickets_created_total", Unit::Count, "Tickets created");
    describe_counter!("ticketing_payment_submissions_total", Unit::Count, "Checkout submissions by resulting transaction status");
    describe_counter!("ticketing_payment_verifications_total", Unit::Count, "Payment verifications by resulting status");
    describe_histogram!("ticketing_gateway_duration_ms", Unit::Milliseconds, "Payment gateway call latency in milliseconds");

    describe_counter!("ticketing_scans_total", Unit::Count, "Gate scans by outcome");

    describe_counter!("ticketing_import_rows_total", Unit::Count, "Imported CSV rows by outcome");
    describe_histogram!("ticketing_import_batch_rows", Unit::Count, "Rows per bulk import");
    describe_histogram!("ticketing_import_batch_duration_ms", Unit::Milliseconds, "Bulk import duration in milliseconds");

    describe_counter!("ticketing_sms_total", Unit::Count, "SMS notifications by template and delivery");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.initialized);
        // No recorder installed: recording is a no-op.
        metrics.record_scan("USAGE");
    }
}
