//! Schedule evaluation — time windows, time zones, maintenance-window overrides.
//!
//! Authoring or parsing a schedule *expression language* is explicitly out of
//! scope (a separate parser owns that); this module only evaluates an
//! already-structured [`Schedule`] against an instant.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use thiserror::Error;

use crate::clock::{Clock, ClockError};
use crate::types::{DesiredState, Instance};

/// Errors evaluating a schedule or maintenance window.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
    #[error("schedule '{0}' has no periods and no maintenance window")]
    Empty(String),
}

impl From<ClockError> for ScheduleError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::UnknownTimeZone(zone) => ScheduleError::UnknownTimeZone(zone),
        }
    }
}

/// One named, contiguous window within a [`Schedule`] during which a
/// specific desired state applies.
///
/// Periods are evaluated in the order they appear in [`Schedule::periods`];
/// the first period whose weekday/month/day-of-month/time-of-day window
/// contains the instant wins.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Period {
    pub name: String,
    /// `None` means "from the start of the day".
    pub begin_time: Option<NaiveTime>,
    /// `None` means "to the end of the day".
    pub end_time: Option<NaiveTime>,
    /// `None` means "every day of the week".
    pub weekdays: Option<HashSet<Weekday>>,
    /// `None` means "every month".
    pub months: Option<HashSet<u32>>,
    /// `None` means "every day of the month".
    pub monthdays: Option<HashSet<u32>>,
    /// Machine type pinned by this period, if any.
    pub instance_type: Option<String>,
}

impl Period {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            begin_time: None,
            end_time: None,
            weekdays: None,
            months: None,
            monthdays: None,
            instance_type: None,
        }
    }

    pub fn with_time_range(mut self, begin: NaiveTime, end: NaiveTime) -> Self {
        self.begin_time = Some(begin);
        self.end_time = Some(end);
        self
    }

    pub fn with_weekdays(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = Some(weekdays.into_iter().collect());
        self
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    /// Whether `local` (already expressed in the schedule's time zone) falls
    /// inside this period.
    pub fn contains(&self, local: DateTime<chrono_tz::Tz>) -> bool {
        if let Some(weekdays) = &self.weekdays {
            if !weekdays.contains(&local.weekday()) {
                return false;
            }
        }
        if let Some(months) = &self.months {
            if !months.contains(&local.naive_local().date().format("%m").to_string().parse().unwrap_or(0)) {
                return false;
            }
        }
        if let Some(monthdays) = &self.monthdays {
            use chrono::Datelike;
            if !monthdays.contains(&local.day()) {
                return false;
            }
        }
        let time = local.time();
        let begin = self.begin_time.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let end = self
            .end_time
            .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        time >= begin && time <= end
    }
}

/// A named recurring policy mapping (time, time-zone, day) to a desired
/// state and optional machine type.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Schedule {
    pub name: String,
    pub default_timezone: String,
    pub enforced: bool,
    pub retain_running: bool,
    pub stop_new_instances: bool,
    pub use_maintenance_window: bool,
    /// Priority-ordered; first match wins.
    pub periods: Vec<Period>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, default_timezone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_timezone: default_timezone.into(),
            enforced: false,
            retain_running: false,
            stop_new_instances: true,
            use_maintenance_window: false,
            periods: Vec::new(),
        }
    }

    /// Evaluates the schedule itself (ignoring maintenance windows) at the
    /// instant reported by `clock`, expressed in [`Schedule::default_timezone`].
    ///
    /// Returns `(desired_state, desired_type, active_period_name)`.
    /// When no period matches, the desired state is `Stopped` if the
    /// schedule declares at least one period (the instance is outside all of
    /// them), or `Any` if the schedule declares no periods at all.
    pub fn evaluate(
        &self,
        clock: &dyn Clock,
    ) -> Result<(DesiredState, Option<String>, Option<String>), ScheduleError> {
        let local = clock.now_in(&self.default_timezone)?;
        for period in &self.periods {
            if period.contains(local) {
                return Ok((
                    DesiredState::Running,
                    period.instance_type.clone(),
                    Some(period.name.clone()),
                ));
            }
        }
        if self.periods.is_empty() {
            Ok((DesiredState::Any, None, None))
        } else {
            Ok((DesiredState::Stopped, None, None))
        }
    }
}

/// An externally-defined recurring interval (already resolved to concrete
/// UTC start/end instants by the out-of-scope maintenance-window discovery
/// RPC) that forces `running` when it intersects the current instant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MaintenanceWindow {
    pub name: String,
    pub windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl MaintenanceWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            windows: Vec::new(),
        }
    }

    pub fn with_window(mut self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.windows.push((begin, end));
        self
    }

    /// `(desired_state, desired_type, running_period)` at `utc_instant`.
    /// Only ever returns `Running` (inside a window) or `Any` (outside all
    /// of them) — a maintenance window never forces a stop.
    pub fn evaluate(&self, utc_instant: DateTime<Utc>) -> (DesiredState, Option<String>, Option<String>) {
        for (begin, end) in &self.windows {
            if utc_instant >= *begin && utc_instant <= *end {
                return (DesiredState::Running, None, Some(self.name.clone()));
            }
        }
        (DesiredState::Any, None, None)
    }
}

/// Implements the full §4.2 contract: consult the maintenance window first
/// (if opted in and present), otherwise fall back to the schedule itself.
///
/// Returns `(desired_state, desired_type, active_period_name)` — the period
/// name is the matched [`Period::name`] or, when a maintenance window wins,
/// its [`MaintenanceWindow::name`].
pub fn desired_state_for_instance(
    schedule: &Schedule,
    instance: &Instance,
    clock: &dyn Clock,
    windows: &HashMap<String, MaintenanceWindow>,
) -> Result<(DesiredState, Option<String>, Option<String>), ScheduleError> {
    if schedule.use_maintenance_window {
        if let Some(window_name) = &instance.maintenance_window {
            if let Some(window) = windows.get(window_name) {
                let (state, desired_type, period) = window.evaluate(clock.now_utc());
                if state == DesiredState::Running {
                    return Ok((DesiredState::Running, desired_type, period));
                }
            }
        }
    }
    let (state, desired_type, period) = schedule.evaluate(clock)?;
    Ok((state, desired_type, period))
}
