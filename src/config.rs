use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub payment: PaymentSettings,
    pub sms: SmsSettings,
    #[serde(default)]
    pub event: EventSettings,
    #[serde(default)]
    pub import: ImportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Mobile-money checkout gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsSettings {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub sender_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Venue-level rules used by validation and the entry scanner.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSettings {
    pub timezone: String,
    /// How early before a session starts a ticket is accepted at the gate.
    pub pre_entry_minutes: i64,
    pub max_quantity: i32,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            timezone: "Africa/Dar_es_Salaam".to_string(),
            pre_entry_minutes: 120,
            max_quantity: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportSettings {
    pub row_delay_ms: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { row_delay_ms: 100 }
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_currency() -> String {
    "TZS".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
