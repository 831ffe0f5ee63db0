use chrono::{DateTime, Utc};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whole hours from `earlier` to `later`, rounded to the nearest hour and
/// clamped at zero.
pub fn hours_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> i64 {
    let secs = (*later - *earlier).num_seconds().max(0);
    (secs as f64 / 3600.0).round() as i64
}
