//! Clock & time-zone resolution — pure, no I/O.
//!
//! Injecting [`Clock`] rather than calling `Utc::now()` directly throughout
//! the engine makes timing-sensitive scheduling decisions deterministic in
//! tests. Implementations must not cache past the second.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors resolving a named time zone.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClockError {
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

/// Provides the current instant, and lets callers express it in a named
/// IANA zone.
pub trait Clock: Send + Sync {
    /// The current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// The current instant expressed in `zone_name` (an IANA zone such as
    /// `"America/New_York"`).
    ///
    /// # Errors
    /// Returns [`ClockError::UnknownTimeZone`] if `zone_name` cannot be
    /// resolved.
    fn now_in(&self, zone_name: &str) -> Result<DateTime<Tz>, ClockError> {
        let tz: Tz = zone_name
            .parse()
            .map_err(|_| ClockError::UnknownTimeZone(zone_name.to_string()))?;
        Ok(self.now_utc().with_timezone(&tz))
    }
}

/// The default [`Clock`] implementation backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A [`Clock`] that always reports a fixed instant. Used by tests so that
/// period-boundary behavior is exercised deterministically.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
