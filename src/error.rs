use thiserror::Error;

/// Application-wide error type.
///
/// Expected business rejections (a failed validation step, a refused scan)
/// are returned as values inside the operation outcome. This type is for
/// failures the caller cannot act on directly.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("SMS gateway error: {0}")]
    Sms(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code used in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PaymentGateway(_) => "PAYMENT_GATEWAY_ERROR",
            AppError::Sms(_) => "SMS_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for errors that originate inside this system rather
    /// than in the caller's input.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(AppError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(AppError::PaymentGateway("x".into()).code(), "PAYMENT_GATEWAY_ERROR");
    }

    #[test]
    fn test_system_classification() {
        assert!(AppError::Internal(anyhow::anyhow!("boom")).is_system());
        assert!(AppError::Database(sqlx::Error::RowNotFound).is_system());
        assert!(!AppError::Validation("bad".into()).is_system());
        assert!(!AppError::Sms("down".into()).is_system());
    }
}
