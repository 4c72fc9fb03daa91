//! `scheduler-foundation` — default concrete implementations of every
//! trait `scheduler-kernel` defines: a real-clock, an in-memory state
//! store, a reference service driver for demos and tests, a layered
//! file+environment configuration loader, and `tracing`-backed metrics and
//! deconfigure channels.
//!
//! Nothing here is mandatory — a host application is free to swap any one
//! of these for a production backend while keeping the rest.

pub mod bus;
pub mod config_loader;
pub mod driver;
pub mod metrics;
pub mod session;
pub mod state_store;

pub use bus::{LoggingDeconfigureChannel, RecordingDeconfigureChannel};
pub use driver::{ReferenceFleet, ReferenceServiceDriver};
pub use metrics::TracingMetricsSink;
pub use session::StaticRoleAssumer;
pub use state_store::InMemoryStateStore;

pub use scheduler_kernel::SystemClock;
