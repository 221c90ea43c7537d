use crate::error::{AppError, Result};
use crate::models::{PaymentStatus, Ticket, TicketStatus};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const TICKET_COLUMNS: &str = "id, ticket_code, session_id, purchaser_name, purchaser_phone, ticket_type, total_amount, quantity, status, payment_status, payment_method_id, is_imported, metadata, created_at, updated_at";

/// Repository for ticket rows.
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a ticket inside an open database transaction.
    pub async fn insert(conn: &mut PgConnection, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, ticket_code, session_id, purchaser_name, purchaser_phone, ticket_type, total_amount, quantity, status, payment_status, payment_method_id, is_imported, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_code)
        .bind(ticket.session_id)
        .bind(&ticket.purchaser_name)
        .bind(&ticket.purchaser_phone)
        .bind(ticket.ticket_type)
        .bind(ticket.total_amount)
        .bind(ticket.quantity)
        .bind(ticket.status)
        .bind(ticket.payment_status)
        .bind(&ticket.payment_method_id)
        .bind(ticket.is_imported)
        .bind(&ticket.metadata)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Ticket code {} already exists", ticket.ticket_code))
            }
            other => AppError::Database(other),
        })?;

        Ok(())
    }

    /// Moves a ticket's payment out of PENDING. Returns false when the ticket
    /// had already left PENDING, leaving it untouched.
    pub async fn update_payment_state(
        conn: &mut PgConnection,
        ticket_id: Uuid,
        status: TicketStatus,
        payment_status: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = $2, payment_status = $3, updated_at = NOW()
            WHERE id = $1 AND payment_status = 'PENDING' AND status = 'PENDING'
            "#,
        )
        .bind(ticket_id)
        .bind(status)
        .bind(payment_status)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Flips an ACTIVE ticket to USED. Zero affected rows means another
    /// scanner got there first or the ticket is not admissible.
    pub async fn mark_used(conn: &mut PgConnection, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'USED', updated_at = $2
            WHERE id = $1 AND status <> 'USED'
            "#,
        )
        .bind(ticket_id)
        .bind(at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        let row = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        let row = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE ticket_code = $1",
            TICKET_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn code_exists(&self, code: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tickets WHERE ticket_code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;

        Ok(exists)
    }

    /// Tickets bought by the same person: exact phone, case-insensitive name.
    /// Oldest first.
    pub async fn find_by_purchaser(&self, phone: &str, name: &str) -> Result<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {}
            FROM tickets
            WHERE purchaser_phone = $1 AND LOWER(purchaser_name) = LOWER($2)
            ORDER BY created_at ASC
            "#,
            TICKET_COLUMNS
        ))
        .bind(phone)
        .bind(name.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
