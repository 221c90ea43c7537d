use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A calendar day of the event. Sessions hang off a day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventDay {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl EventDay {
    pub fn new(name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            date,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns true if the given local date is this event day.
    pub fn is_on(&self, local_date: NaiveDate) -> bool {
        self.date == local_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_day_creation() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
        let day = EventDay::new("Day 1", date);
        assert!(day.is_active);
        assert!(day.is_on(date));
        assert!(!day.is_on(date.succ_opt().unwrap()));
        assert!(!day.inactive().is_active);
    }
}
