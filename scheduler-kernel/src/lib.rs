//! `scheduler-kernel` — trait contracts and pure domain logic for the
//! cloud-fleet instance scheduler.
//!
//! This crate has no knowledge of a concrete clock, storage backend, cloud
//! SDK, or telemetry sink: every collaborator the engine needs is a trait,
//! implemented by the `scheduler-foundation` crate (or a host application).

pub mod bus;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod schedule;
pub mod session;
pub mod state_store;
pub mod types;

pub use bus::{DeconfigureChannel, DeconfigureNotice};
pub use clock::{Clock, ClockError, FixedClock, SystemClock};
pub use config::{
    expand_tag_list, expand_tag_template, is_empty_or_missing, ConfigError, SchedulerConfiguration, TemplateContext,
};
pub use driver::{DriverError, DriverParams, DriverStateUpdate, ResizeParams, ServiceDriver};
pub use engine::{AccountResult, ResultMap, RuntimeContext, SchedulingEngine};
pub use error::{KernelError, KernelResult};
pub use metrics::{MetricsSink, ScheduleMetricHit, SchedulerMetrics, UsageCounters};
pub use schedule::{desired_state_for_instance, MaintenanceWindow, Period, Schedule, ScheduleError};
pub use session::{accounts, Account, AccountListing, AssumeRoleError, RoleAssumer, SessionError};
pub use state_store::{InstanceStateStore, StateStoreError};
pub use types::{CurrentState, DesiredState, Instance, PersistedState, Scope};
