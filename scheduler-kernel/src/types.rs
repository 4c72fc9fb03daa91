//! Core domain types shared across the kernel: instances, states, and the
//! account/region scope that keys persisted state.
//!
//! These are fixed structs with explicit `tags` maps and typed optionals —
//! the engine never depends on attribute presence by name lookup.

use std::collections::HashMap;
use std::fmt;

/// The observed runtime state of an instance as reported by the service driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum CurrentState {
    Running,
    Stopped,
    Terminated,
    /// Mid-transition (starting, stopping, rebooting, ...); the driver
    /// reports this when it cannot yet assert a stable state.
    Transitional,
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CurrentState::Running => "running",
            CurrentState::Stopped => "stopped",
            CurrentState::Terminated => "terminated",
            CurrentState::Transitional => "transitional",
        };
        f.write_str(s)
    }
}

/// The desired state an instance should be driven towards, as produced by a
/// [`crate::schedule::Schedule`] evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum DesiredState {
    Running,
    Stopped,
    /// Transient: stop the instance so it can be relaunched at a new machine
    /// type. The engine treats this as a synonym of `Stopped` with a resize
    /// marker; the persisted record after the stop completes is `Stopped`.
    StoppedForResize,
    /// Do nothing new this cycle.
    Any,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DesiredState::Running => "running",
            DesiredState::Stopped => "stopped",
            DesiredState::StoppedForResize => "stopped_for_resize",
            DesiredState::Any => "any",
        };
        f.write_str(s)
    }
}

/// The last desired state recorded for an instance, as read from the state
/// store. `Unknown` is the implicit value when no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum PersistedState {
    Unknown,
    Running,
    Stopped,
    RetainRunning,
}

impl fmt::Display for PersistedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PersistedState::Unknown => "unknown",
            PersistedState::Running => "running",
            PersistedState::Stopped => "stopped",
            PersistedState::RetainRunning => "retain_running",
        };
        f.write_str(s)
    }
}

impl PersistedState {
    /// Maps a driver-reported [`CurrentState`] into the persisted-state
    /// vocabulary used when the engine stores "what the driver told us it did".
    pub fn from_driver_state(state: CurrentState) -> Self {
        match state {
            CurrentState::Running => PersistedState::Running,
            CurrentState::Stopped | CurrentState::Terminated => PersistedState::Stopped,
            // A transitional report is persisted as-is-unknown-ish: callers
            // should not assume convergence yet, but we must still record
            // *something* so cleanup/load stay coherent. We record `Stopped`
            // only when driven from a stop action and `Running` from a start
            // action at the call site, never here.
            CurrentState::Transitional => PersistedState::Unknown,
        }
    }
}

/// The `(service, account, region)` scope under which instance state and
/// per-cycle batches are grouped. This is the unit of state-store coherence
/// and failure containment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Scope {
    pub service: String,
    pub account: String,
    pub region: String,
}

impl Scope {
    pub fn new(service: impl Into<String>, account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            region: region.into(),
        }
    }

    /// Key prefix used by a range-scan-capable state store backend.
    pub fn key_prefix(&self) -> String {
        format!("{}.{}.{}", self.service, self.account, self.region)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.account, self.region)
    }
}

/// A schedulable instance as produced by a [`crate::driver::ServiceDriver`].
/// Never persisted directly by the core; the engine only persists the
/// derived [`PersistedState`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Instance {
    pub id: String,
    pub display_name: Option<String>,
    pub service: String,
    pub account: String,
    pub region: String,
    pub current_state: CurrentState,
    pub machine_type: String,
    pub allow_resize: bool,
    pub schedule_name: String,
    pub maintenance_window: Option<String>,
    pub tags: HashMap<String, String>,
    /// Set by the engine when it decides this instance is being stopped as
    /// part of a resize (`DesiredState::StoppedForResize`); drivers may read
    /// this to pick a differently-shaped stop call (e.g. snapshot first).
    pub resized: bool,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.current_state == CurrentState::Running
    }

    pub fn is_terminated(&self) -> bool {
        self.current_state == CurrentState::Terminated
    }

    /// `SERVICE:id (display_name)` — matches the display string convention
    /// used in log messages throughout the engine.
    pub fn display_string(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => {
                format!("{}:{} ({})", self.service.to_uppercase(), self.id, name)
            }
            _ => format!("{}:{}", self.service.to_uppercase(), self.id),
        }
    }
}
