use crate::error::{AppError, Result};
use crate::models::{Attendee, AttendeeDetails, InstitutionType, TicketType};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct AdultAttendeeRow {
    id: Uuid,
    ticket_id: Uuid,
    full_name: String,
    phone_number: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StudentAttendeeRow {
    id: Uuid,
    ticket_id: Uuid,
    full_name: String,
    phone_number: String,
    student_id: String,
    institution_type: InstitutionType,
    institution_name: Option<String>,
    is_used: bool,
    scanned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ChildAttendeeRow {
    id: Uuid,
    ticket_id: Uuid,
    full_name: String,
    phone_number: String,
    parent_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AdultAttendeeRow> for Attendee {
    fn from(row: AdultAttendeeRow) -> Self {
        Attendee {
            id: row.id,
            ticket_id: row.ticket_id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            details: AttendeeDetails::Adult,
            created_at: row.created_at,
        }
    }
}

impl From<StudentAttendeeRow> for Attendee {
    fn from(row: StudentAttendeeRow) -> Self {
        Attendee {
            id: row.id,
            ticket_id: row.ticket_id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            details: AttendeeDetails::Student {
                student_id: row.student_id,
                institution_type: row.institution_type,
                institution_name: row.institution_name,
                is_used: row.is_used,
                scanned_at: row.scanned_at,
            },
            created_at: row.created_at,
        }
    }
}

impl From<ChildAttendeeRow> for Attendee {
    fn from(row: ChildAttendeeRow) -> Self {
        Attendee {
            id: row.id,
            ticket_id: row.ticket_id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            details: AttendeeDetails::Child {
                parent_name: row.parent_name,
            },
            created_at: row.created_at,
        }
    }
}

/// Repository for the three type-specific attendee tables.
pub struct AttendeeRepository {
    pool: PgPool,
}

impl AttendeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an attendee into the table matching its type.
    pub async fn insert(conn: &mut PgConnection, attendee: &Attendee) -> Result<()> {
        let query = match &attendee.details {
            AttendeeDetails::Adult => sqlx::query(
                r#"
                INSERT INTO adult_attendees (id, ticket_id, full_name, phone_number, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(attendee.id)
            .bind(attendee.ticket_id)
            .bind(&attendee.full_name)
            .bind(&attendee.phone_number)
            .bind(attendee.created_at),
            AttendeeDetails::Student {
                student_id,
                institution_type,
                institution_name,
                is_used,
                scanned_at,
            } => sqlx::query(
                r#"
                INSERT INTO student_attendees (id, ticket_id, full_name, phone_number, student_id, institution_type, institution_name, is_used, scanned_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(attendee.id)
            .bind(attendee.ticket_id)
            .bind(&attendee.full_name)
            .bind(&attendee.phone_number)
            .bind(student_id)
            .bind(*institution_type)
            .bind(institution_name)
            .bind(*is_used)
            .bind(*scanned_at)
            .bind(attendee.created_at),
            AttendeeDetails::Child { parent_name } => sqlx::query(
                r#"
                INSERT INTO child_attendees (id, ticket_id, full_name, phone_number, parent_name, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(attendee.id)
            .bind(attendee.ticket_id)
            .bind(&attendee.full_name)
            .bind(&attendee.phone_number)
            .bind(parent_name)
            .bind(attendee.created_at),
        };

        query.execute(conn).await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Marks every student attendee of a ticket as scanned.
    pub async fn mark_students_scanned(
        conn: &mut PgConnection,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE student_attendees
            SET is_used = TRUE, scanned_at = $2
            WHERE ticket_id = $1 AND is_used = FALSE
            "#,
        )
        .bind(ticket_id)
        .bind(at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_ticket(&self, ticket_id: Uuid, ticket_type: TicketType) -> Result<Vec<Attendee>> {
        let attendees = match ticket_type {
            TicketType::Adult => sqlx::query_as::<_, AdultAttendeeRow>(
                r#"
                SELECT id, ticket_id, full_name, phone_number, created_at
                FROM adult_attendees
                WHERE ticket_id = $1
                ORDER BY created_at ASC, full_name ASC
                "#,
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?
            .into_iter()
            .map(Attendee::from)
            .collect(),
            TicketType::Student => sqlx::query_as::<_, StudentAttendeeRow>(
                r#"
                SELECT id, ticket_id, full_name, phone_number, student_id, institution_type, institution_name, is_used, scanned_at, created_at
                FROM student_attendees
                WHERE ticket_id = $1
                ORDER BY created_at ASC, full_name ASC
                "#,
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?
            .into_iter()
            .map(Attendee::from)
            .collect(),
            TicketType::Child => sqlx::query_as::<_, ChildAttendeeRow>(
                r#"
                SELECT id, ticket_id, full_name, phone_number, parent_name, created_at
                FROM child_attendees
                WHERE ticket_id = $1
                ORDER BY created_at ASC, full_name ASC
                "#,
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?
            .into_iter()
            .map(Attendee::from)
            .collect(),
        };

        Ok(attendees)
    }
}
