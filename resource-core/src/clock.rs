/*!
Generation timestamps embedded in saved resource files.
*/

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A wall-clock instant captured once per save
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    /// RFC 3339 rendering for humans
    pub datetime: String,

    /// Seconds since the Unix epoch
    pub unix_timestamp: i64,
}

impl Timestamp {
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self {
            datetime: datetime.to_rfc3339(),
            unix_timestamp: datetime.timestamp(),
        }
    }
}

/// Source of generation timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

/// Clock that always reports the same instant
///
/// # Example
/// ```rust
/// use resource_core::{Clock, FixedClock};
///
/// let clock = FixedClock::at_unix(1_700_000_000);
/// assert_eq!(clock.now().unix_timestamp, 1_700_000_000);
/// assert_eq!(clock.now().datetime, "2023-11-14T22:13:20+00:00");
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: Timestamp,
}

impl FixedClock {
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self {
            timestamp: Timestamp::from_datetime(datetime),
        }
    }

    /// Fixed clock at the given Unix time, falling back to the epoch when out of range
    pub fn at_unix(seconds: i64) -> Self {
        let datetime = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .unwrap_or_default();
        Self::new(datetime)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.timestamp.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_is_stable() {
        let clock = FixedClock::at_unix(86_400);
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().datetime, "1970-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_system_clock_agrees_with_itself() {
        let now = SystemClock::new().now();
        let parsed = DateTime::parse_from_rfc3339(&now.datetime).unwrap();
        assert_eq!(parsed.timestamp(), now.unix_timestamp);
    }
}
