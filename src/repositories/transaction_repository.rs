use crate::error::{AppError, Result};
use crate::models::{PaymentTransaction, TransactionStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for payment transaction rows.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a transaction inside an open database transaction.
    pub async fn insert(conn: &mut PgConnection, transaction: &PaymentTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, ticket_id, external_id, provider, account_number, amount, status, error_message, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.ticket_id)
        .bind(&transaction.external_id)
        .bind(&transaction.provider)
        .bind(&transaction.account_number)
        .bind(transaction.amount)
        .bind(transaction.status)
        .bind(&transaction.error_message)
        .bind(&transaction.metadata)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// The single permitted mutation of a transaction row: PENDING to a
    /// final status. Returns false if the row was no longer PENDING.
    pub async fn settle(
        conn: &mut PgConnection,
        id: Uuid,
        status: TransactionStatus,
        error_message: Option<&str>,
        verification: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                error_message = COALESCE($3, error_message),
                metadata = CASE WHEN $4::jsonb IS NULL THEN metadata
                                ELSE COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('verification', $4::jsonb) END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .bind(verification)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Latest transaction carrying an external id. Retries reuse the id.
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, ticket_id, external_id, provider, account_number, amount, status, error_message, metadata, created_at, updated_at
            FROM transactions
            WHERE external_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, ticket_id, external_id, provider, account_number, amount, status, error_message, metadata, created_at, updated_at
            FROM transactions
            WHERE ticket_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
