use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use ticket_office::api::{create_router, AppState, ServiceOptions};
use ticket_office::config::Settings;
use ticket_office::gateways::{DisabledSmsSender, HttpPaymentGateway, HttpSmsSender, SmsSender};
use ticket_office::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use ticket_office::repositories::PgTicketingStore;
use ticket_office::utils::{EventClock, SystemClock};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&LogConfig::from_settings(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics();
    let clock = EventClock::from_name(&settings.event.timezone, Arc::new(SystemClock))?;

    // Connect to PostgreSQL
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    let gateway = Arc::new(HttpPaymentGateway::new(&settings.payment)?);
    let sms: Arc<dyn SmsSender> = if settings.sms.enabled {
        Arc::new(HttpSmsSender::new(&settings.sms)?)
    } else {
        info!("SMS delivery disabled");
        Arc::new(DisabledSmsSender)
    };

    let state = AppState::new(
        Arc::new(PgTicketingStore::new(pool.clone())),
        gateway,
        sms,
        clock,
        ServiceOptions::from_settings(&settings),
        Arc::new(HealthChecker::new(pool, settings.sms.enabled)),
    )
    .with_metrics(metrics_handle);

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, timezone = %settings.event.timezone, "Ticket office listening");

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
