//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Time elapsed since `since`, clamped to zero for timestamps in the future
/// (clock skew between the writer of a marker and the reader).
pub fn age_of(since: DateTime<Utc>) -> Duration {
    (now() - since).to_std().unwrap_or(Duration::ZERO)
}

/// Convert seconds to duration
pub fn secs_to_duration(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
