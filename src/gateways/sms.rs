use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SmsSettings;
use crate::error::{AppError, Result};

/// Provider's answer to a send request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsDelivery {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl SmsDelivery {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message_id: Some(message_id.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message_id: None,
        }
    }
}

/// Outbound SMS provider. Receives plain text only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<SmsDelivery>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    to: &'a str,
    message: &'a str,
    sender_id: &'a str,
}

pub struct HttpSmsSender {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    sender_id: String,
}

impl HttpSmsSender {
    pub fn new(settings: &SmsSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Sms(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            sender_id: settings.sender_id.clone(),
        })
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, phone: &str, message: &str) -> Result<SmsDelivery> {
        let mut request = self.client.post(&self.api_url).json(&SendRequest {
            to: phone,
            message,
            sender_id: &self.sender_id,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Sms(format!("SMS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(SmsDelivery::failed(format!("SMS provider returned HTTP {}", status.as_u16())));
        }

        response
            .json::<SmsDelivery>()
            .await
            .map_err(|e| AppError::Sms(format!("Invalid SMS provider response: {}", e)))
    }
}

/// Used when SMS delivery is switched off in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSmsSender;

#[async_trait]
impl SmsSender for DisabledSmsSender {
    async fn send(&self, phone: &str, _message: &str) -> Result<SmsDelivery> {
        tracing::debug!(phone = %crate::observability::mask_phone(phone), "SMS disabled, message not sent");
        Ok(SmsDelivery::failed("SMS delivery is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_parsing() {
        let delivery: SmsDelivery = serde_json::from_str(r#"{"success":true,"messageId":"m-1"}"#).unwrap();
        assert!(delivery.success);
        assert_eq!(delivery.message_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn test_disabled_sender_never_delivers() {
        let delivery = DisabledSmsSender.send("255712345678", "hello").await.unwrap();
        assert!(!delivery.success);
        assert!(delivery.error.is_some());
    }
}
