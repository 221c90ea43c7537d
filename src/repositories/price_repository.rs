use crate::error::{AppError, Result};
use crate::models::{PaymentMethod, TicketPrice, TicketType};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for the price list and accepted payment methods.
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_price(&self, price: &TicketPrice) -> Result<TicketPrice> {
        let row = sqlx::query_as::<_, TicketPrice>(
            r#"
            INSERT INTO ticket_prices (id, ticket_type, price, day_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, ticket_type, price, day_id, is_active, created_at
            "#,
        )
        .bind(price.id)
        .bind(price.ticket_type)
        .bind(price.price)
        .bind(price.day_id)
        .bind(price.is_active)
        .bind(price.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Active price for a ticket type. A day-specific price wins over a
    /// general (day-less) one.
    pub async fn find_active_price(
        &self,
        ticket_type: TicketType,
        day_id: Uuid,
    ) -> Result<Option<TicketPrice>> {
        let row = sqlx::query_as::<_, TicketPrice>(
            r#"
            SELECT id, ticket_type, price, day_id, is_active, created_at
            FROM ticket_prices
            WHERE ticket_type = $1
              AND is_active = TRUE
              AND (day_id = $2 OR day_id IS NULL)
            ORDER BY (day_id IS NULL) ASC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(ticket_type)
        .bind(day_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn create_payment_method(&self, method: &PaymentMethod) -> Result<PaymentMethod> {
        let row = sqlx::query_as::<_, PaymentMethod>(
            r#"
            INSERT INTO payment_methods (id, name, provider, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, provider = EXCLUDED.provider, is_active = EXCLUDED.is_active
            RETURNING id, name, provider, is_active
            "#,
        )
        .bind(&method.id)
        .bind(&method.name)
        .bind(&method.provider)
        .bind(method.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Looks a payment method up by slug, case-insensitively.
    pub async fn find_payment_method(&self, id: &str) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query_as::<_, PaymentMethod>(
            r#"
            SELECT id, name, provider, is_active
            FROM payment_methods
            WHERE LOWER(id) = LOWER($1)
            "#,
        )
        .bind(id.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
