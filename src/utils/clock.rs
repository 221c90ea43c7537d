use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Pins the clock to a wall-clock time in the given zone.
    pub fn at_local(tz: Tz, local: NaiveDateTime) -> Self {
        let utc = tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local));
        Self::new(utc)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Resolves "now" in the event's local timezone.
#[derive(Clone)]
pub struct EventClock {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl EventClock {
    pub const DEFAULT_TIMEZONE: &'static str = "Africa/Dar_es_Salaam";

    pub fn new(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { tz, clock }
    }

    /// Builds a clock from an IANA timezone name.
    pub fn from_name(name: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| AppError::Validation(format!("Unknown timezone '{}'", name)))?;
        Ok(Self::new(tz, clock))
    }

    pub fn system_default() -> Self {
        Self::new(chrono_tz::Africa::Dar_es_Salaam, Arc::new(SystemClock))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    pub fn now_local(&self) -> DateTime<Tz> {
        self.clock.now_utc().with_timezone(&self.tz)
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }

    pub fn local_time(&self) -> NaiveTime {
        self.now_local().time()
    }
}

impl std::fmt::Debug for EventClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClock").field("tz", &self.tz).finish()
    }
}
