use hifitime::Epoch;
use serde::{Deserialize, Serialize};

/// Start and end of one radar integration record, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub start: f64,
    pub end: f64,
}

impl TimeRecord {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Fractional year of a unix timestamp, used to pin the geomagnetic model epoch.
pub fn decimal_year(unix_seconds: f64) -> f64 {
    let epoch = Epoch::from_unix_seconds(unix_seconds);
    let (year, ..) = epoch.to_gregorian_utc();
    let year_start = Epoch::from_gregorian_utc_at_midnight(year, 1, 1);
    let next_year = Epoch::from_gregorian_utc_at_midnight(year + 1, 1, 1);
    let elapsed = (epoch - year_start).to_seconds();
    let length = (next_year - year_start).to_seconds();
    year as f64 + elapsed / length
}
