use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PaymentSettings;
use crate::error::{AppError, Result};
use crate::models::TransactionStatus;

/// Charge request sent to the mobile-money gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub account_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub reference: String,
    pub customer_name: String,
    pub description: String,
}

/// Synchronous acknowledgement of a checkout request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "azampay_data", alias = "data")]
    pub data: Option<serde_json::Value>,
}

impl CheckoutResponse {
    pub fn success(external_id: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            external_id: Some(external_id.into()),
            ..Default::default()
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyData {
    #[serde(default)]
    pub status: Option<String>,
}

/// Answer of the gateway's verification endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<VerifyData>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VerifyResponse {
    pub fn with_payment_status(status: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(VerifyData { status: Some(status.into()) }),
            message: None,
        }
    }

    /// Payment status reported in `data.status`, if recognised.
    pub fn payment_status(&self) -> Option<TransactionStatus> {
        self.data
            .as_ref()
            .and_then(|d| d.status.as_deref())
            .and_then(TransactionStatus::from_gateway)
    }
}

/// External mobile-money payment gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a charge. A parsed refusal is `Ok` with a non-success status;
    /// `Err` means no usable answer was received.
    async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResponse>;

    /// Asks the gateway for the current state of a transaction.
    async fn verify(&self, transaction_id: &str) -> Result<VerifyResponse>;
}

/// `reqwest` client for the JSON gateway API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(settings: &PaymentSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::PaymentGateway(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResponse> {
        debug!(reference = %request.reference, provider = %request.provider, "Submitting checkout");

        let response = self
            .authorize(self.client.post(&self.api_url))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Checkout request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Failed to read checkout response: {}", e)))?;

        match serde_json::from_str::<CheckoutResponse>(&body) {
            Ok(parsed) if status.is_success() || !parsed.status.is_empty() => Ok(parsed),
            Ok(_) | Err(_) => {
                warn!(http_status = %status, "Unreadable checkout response");
                Err(AppError::PaymentGateway(format!(
                    "Unexpected checkout response (HTTP {})",
                    status.as_u16()
                )))
            }
        }
    }

    async fn verify(&self, transaction_id: &str) -> Result<VerifyResponse> {
        let url = format!("{}/verify/{}", self.api_url, transaction_id);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Verification request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::PaymentGateway(format!(
                "Verification endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<VerifyResponse>()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Invalid verification response: {}", e)))
    }
}
