//! Service driver contract — the cloud-service adapter the engine commits
//! decisions through. One implementation per scheduled service (EC2, RDS,
//! ...); the kernel never talks to a cloud API directly.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::types::Instance;

/// Errors from a service driver call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    #[error("failed to list schedulable instances in {account}/{region}: {reason}")]
    ListFailed {
        account: String,
        region: String,
        reason: String,
    },
    #[error("failed to start instance {instance_id}: {reason}")]
    StartFailed { instance_id: String, reason: String },
    #[error("failed to stop instance {instance_id}: {reason}")]
    StopFailed { instance_id: String, reason: String },
    #[error("failed to resize instance {instance_id} to {target_type}: {reason}")]
    ResizeFailed {
        instance_id: String,
        target_type: String,
        reason: String,
    },
}

/// Parameters common to every driver call, threaded through from the
/// engine's current `(account, region)` scope.
#[derive(Debug, Clone)]
pub struct DriverParams<S> {
    pub session: S,
    pub account: String,
    pub role: Option<String>,
    pub region: String,
    pub trace: bool,
}

/// Parameters for [`ServiceDriver::resize_instance`].
#[derive(Debug, Clone)]
pub struct ResizeParams<S> {
    pub common: DriverParams<S>,
    pub instance_id: String,
    pub desired_type: String,
}

use crate::types::CurrentState;

/// The outcome of a start or stop call for a single instance, as reported
/// by the driver — not necessarily the final converged state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverStateUpdate {
    pub instance_id: String,
    pub state: CurrentState,
}

/// The contract a concrete cloud-service adapter implements. `S` is the
/// opaque session type produced by a [`crate::session::RoleAssumer`].
#[async_trait]
pub trait ServiceDriver<S>: Send + Sync {
    /// The service tag this driver handles, e.g. `"ec2"`.
    fn service_name(&self) -> &str;

    /// Whether this service supports resize-on-start.
    fn allow_resize(&self) -> bool;

    /// Lists every schedulable instance visible in `params`' account/region,
    /// as a lazy stream so a cancelled caller need not drain it.
    ///
    /// # Errors
    /// [`DriverError::ListFailed`] is fatal for the `(account, region)`
    /// scope per §7.
    async fn get_schedulable_instances<'a>(
        &'a self,
        params: &'a DriverParams<S>,
    ) -> Result<BoxStream<'a, Instance>, DriverError>;

    /// Starts every instance in `instance_ids`, returning a lazy stream of
    /// per-instance outcomes. A driver that cannot start an instance still
    /// yields an outcome reflecting observed reality (e.g. `Transitional`)
    /// rather than failing the whole batch.
    async fn start_instances<'a>(
        &'a self,
        params: &'a DriverParams<S>,
        instance_ids: &'a [String],
    ) -> Result<BoxStream<'a, DriverStateUpdate>, DriverError>;

    /// Stops every instance in `instance_ids`, symmetric to
    /// [`ServiceDriver::start_instances`].
    async fn stop_instances<'a>(
        &'a self,
        params: &'a DriverParams<S>,
        instance_ids: &'a [String],
    ) -> Result<BoxStream<'a, DriverStateUpdate>, DriverError>;

    /// Resizes a single stopped instance ahead of a scheduled start.
    ///
    /// # Errors
    /// On [`DriverError::ResizeFailed`] the engine must not add the
    /// instance to the start batch this cycle (§4.5.2); it is retried next
    /// cycle.
    async fn resize_instance(&self, params: &ResizeParams<S>) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_messages_mention_instance_id() {
        let err = DriverError::StartFailed {
            instance_id: "i-123".to_string(),
            reason: "throttled".to_string(),
        };
        assert!(err.to_string().contains("i-123"));
        assert!(err.to_string().contains("throttled"));
    }

    #[test]
    fn driver_state_update_equality() {
        let a = DriverStateUpdate {
            instance_id: "i-1".to_string(),
            state: CurrentState::Running,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
