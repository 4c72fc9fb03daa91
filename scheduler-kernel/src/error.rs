//! Crate-level error types for `scheduler-kernel`.
//!
//! Every sub-module owns a `thiserror`-derived, `#[non_exhaustive]` error enum
//! scoped to its own failure modes. [`KernelError`] composes them with `#[from]`
//! conversions so `?` works across module boundaries; callers that need rich,
//! attachable context should wrap it in [`error_stack::Report`] via [`KernelResult`].
//!
//! Which errors are fatal for which scope (instance < region < account < service
//! < cycle) is a property of *where* a given error is handled, not of the error
//! type itself — see the call sites in [`crate::engine`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::schedule::ScheduleError;
use crate::session::SessionError;
use crate::state_store::StateStoreError;

/// Crate-level error type for `scheduler-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A configuration-related error: bad timezone, missing mandatory field.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A failure evaluating a schedule or maintenance window.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// A failure obtaining or using an account session.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A failure from the service driver (list/start/stop/resize).
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A failure reading or persisting instance state.
    #[error("state store error: {0}")]
    StateStore(#[from] StateStoreError),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
