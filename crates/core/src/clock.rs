use chrono::{DateTime, NaiveDate, Utc};

/// Injectable time source. Expiration logic compares calendar dates only,
/// so the trait exposes both the instant and the derived date.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests and deterministic sweeps.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    pub fn advance_days(&mut self, days: i64) {
        self.instant += chrono::Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}
