use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Method a purchaser pays with. `id` is a slug such as `mpesa`;
/// `provider` is the name the payment gateway expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub is_active: bool,
}

impl PaymentMethod {
    /// Slug used for sales that never touched the gateway.
    pub const CASH: &'static str = "CASH";

    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            is_active: true,
        }
    }

    pub fn cash() -> Self {
        Self::new(Self::CASH, "Cash", "Cash")
    }

    pub fn is_cash(&self) -> bool {
        self.id.eq_ignore_ascii_case(Self::CASH)
    }
}
