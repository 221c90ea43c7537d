use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A session within an event day. Times are local wall-clock times.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventSession {
    pub id: Uuid,
    pub day_id: Uuid,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

/// Local time range during which a ticket for a session is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryWindow {
    pub opens_at: NaiveTime,
    /// `None` means the window runs to the end of the day.
    pub closes_at: Option<NaiveTime>,
}

impl EntryWindow {
    pub fn contains(&self, local_time: NaiveTime) -> bool {
        local_time >= self.opens_at && self.closes_at.map_or(true, |closes| local_time <= closes)
    }
}

impl EventSession {
    pub fn new(day_id: Uuid, name: impl Into<String>, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            name: name.into(),
            start_time,
            end_time,
            created_at: Utc::now(),
        }
    }

    pub fn belongs_to(&self, day_id: Uuid) -> bool {
        self.day_id == day_id
    }

    /// Computes the entry window `[start - pre_entry, end]`.
    ///
    /// The opening never wraps to the previous day; it is clamped at midnight.
    /// A session whose end is before its start runs to the end of the day.
    pub fn entry_window(&self, pre_entry: Duration) -> EntryWindow {
        let since_midnight = self.start_time.signed_duration_since(NaiveTime::default());
        let opens_at = if since_midnight >= pre_entry {
            self.start_time - pre_entry
        } else {
            NaiveTime::default()
        };

        let closes_at = if self.end_time < self.start_time {
            None
        } else {
            Some(self.end_time)
        };

        EntryWindow { opens_at, closes_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_entry_window_two_hours_before() {
        let session = EventSession::new(Uuid::new_v4(), "Evening", time(18, 0), time(22, 0));
        let window = session.entry_window(Duration::minutes(120));

        assert_eq!(window.opens_at, time(16, 0));
        assert!(window.contains(time(16, 5)));
        assert!(window.contains(time(22, 0)));
        assert!(!window.contains(time(15, 55)));
        assert!(!window.contains(time(22, 1)));
    }

    #[test]
    fn test_entry_window_clamped_at_midnight() {
        let session = EventSession::new(Uuid::new_v4(), "Early", time(1, 0), time(4, 0));
        let window = session.entry_window(Duration::minutes(120));

        assert_eq!(window.opens_at, time(0, 0));
        assert!(window.contains(time(0, 10)));
        assert!(!window.contains(time(23, 30)));
    }

    #[test]
    fn test_entry_window_past_midnight_end() {
        let session = EventSession::new(Uuid::new_v4(), "Late", time(21, 0), time(1, 0));
        let window = session.entry_window(Duration::minutes(120));

        assert_eq!(window.closes_at, None);
        assert!(window.contains(time(23, 59)));
        assert!(!window.contains(time(18, 59)));
    }

    #[test]
    fn test_belongs_to() {
        let day_id = Uuid::new_v4();
        let session = EventSession::new(day_id, "Morning", time(9, 0), time(12, 0));
        assert!(session.belongs_to(day_id));
        assert!(!session.belongs_to(Uuid::new_v4()));
    }
}
