// src/source/cursor.rs
//! Watermark cursor and the clock it is derived from.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default lookback when a source has never been polled.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 10;

/// Opaque "everything up to here has been seen" token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`, sub-second precision dropped.
    pub fn from_time(t: DateTime<Utc>) -> Self {
        Self(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parsed timestamp, if this cursor is one.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Injectable "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant. Handy for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Cursor used when no prior state exists: now minus `lookback`.
pub fn initial_cursor(clock: &dyn Clock, lookback: Duration) -> Cursor {
    Cursor::from_time(clock.now() - lookback)
}

/// Cursor for the next poll. Must be taken before the first page is
/// requested so items created mid-poll land in the next window.
pub fn advance(clock: &dyn Clock) -> Cursor {
    Cursor::from_time(clock.now())
}

/// Treats a blank saved cursor the same as a missing one.
pub fn resolve(saved: Option<&Cursor>, clock: &dyn Clock, lookback: Duration) -> Cursor {
    match saved {
        Some(c) if !c.is_blank() => c.clone(),
        _ => initial_cursor(clock, lookback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> FixedClock {
        FixedClock(
            Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap()
                + Duration::milliseconds(789),
        )
    }

    #[test]
    fn from_time_truncates_to_seconds_with_z() {
        let c = advance(&clock());
        assert_eq!(c.as_str(), "2024-03-15T12:30:45Z");
    }

    #[test]
    fn initial_cursor_looks_back_ten_days_by_default() {
        let c = initial_cursor(&clock(), Duration::days(DEFAULT_LOOKBACK_DAYS));
        assert_eq!(c.as_str(), "2024-03-05T12:30:45Z");
    }

    #[test]
    fn resolve_prefers_saved_unless_blank() {
        let lb = Duration::days(1);
        let saved = Cursor::new("2023-01-01T00:00:00Z");
        assert_eq!(resolve(Some(&saved), &clock(), lb), saved);
        assert_eq!(
            resolve(Some(&Cursor::new("  ")), &clock(), lb).as_str(),
            "2024-03-14T12:30:45Z"
        );
        assert_eq!(resolve(None, &clock(), lb).as_str(), "2024-03-14T12:30:45Z");
    }

    #[test]
    fn as_time_round_trips_and_tolerates_opaque_tokens() {
        let c = Cursor::new("2023-01-01T00:00:00Z");
        let t = c.as_time().unwrap();
        assert_eq!(Cursor::from_time(t), c);
        assert!(Cursor::new("page-token-abc").as_time().is_none());
    }
}
