use crate::error::{AppError, Result};
use crate::models::{EventDay, EventSession};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for event days and their sessions.
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_day(&self, day: &EventDay) -> Result<EventDay> {
        let row = sqlx::query_as::<_, EventDay>(
            r#"
            INSERT INTO event_days (id, name, date, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, date, is_active, created_at
            "#,
        )
        .bind(day.id)
        .bind(&day.name)
        .bind(day.date)
        .bind(day.is_active)
        .bind(day.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_day(&self, id: Uuid) -> Result<Option<EventDay>> {
        let row = sqlx::query_as::<_, EventDay>(
            r#"
            SELECT id, name, date, is_active, created_at
            FROM event_days
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds the day scheduled on a calendar date, preferring active days.
    pub async fn find_day_by_date(&self, date: NaiveDate) -> Result<Option<EventDay>> {
        let row = sqlx::query_as::<_, EventDay>(
            r#"
            SELECT id, name, date, is_active, created_at
            FROM event_days
            WHERE date = $1
            ORDER BY is_active DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Case-insensitive lookup by display name.
    pub async fn find_day_by_name(&self, name: &str) -> Result<Option<EventDay>> {
        let row = sqlx::query_as::<_, EventDay>(
            r#"
            SELECT id, name, date, is_active, created_at
            FROM event_days
            WHERE LOWER(name) = LOWER($1)
            ORDER BY is_active DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn create_session(&self, session: &EventSession) -> Result<EventSession> {
        let row = sqlx::query_as::<_, EventSession>(
            r#"
            INSERT INTO event_sessions (id, day_id, name, start_time, end_time, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, day_id, name, start_time, end_time, created_at
            "#,
        )
        .bind(session.id)
        .bind(session.day_id)
        .bind(&session.name)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_session(&self, id: Uuid) -> Result<Option<EventSession>> {
        let row = sqlx::query_as::<_, EventSession>(
            r#"
            SELECT id, day_id, name, start_time, end_time, created_at
            FROM event_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Sessions of a day in start-time order.
    pub async fn find_sessions_for_day(&self, day_id: Uuid) -> Result<Vec<EventSession>> {
        let rows = sqlx::query_as::<_, EventSession>(
            r#"
            SELECT id, day_id, name, start_time, end_time, created_at
            FROM event_sessions
            WHERE day_id = $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(day_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
