//! A reference [`ServiceDriver`] implementation backed by an in-memory
//! fleet of instances. Used for demos, integration tests, and as a template
//! for a real cloud-service adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use scheduler_kernel::{CurrentState, DriverError, DriverParams, DriverStateUpdate, Instance, ResizeParams, ServiceDriver};

/// A minimal in-memory fleet of [`Instance`]s, shared via [`Arc`] so a test
/// can hold a handle to mutate state out-of-band (e.g. simulate an
/// operator manually starting an instance between cycles).
#[derive(Clone)]
pub struct ReferenceFleet {
    instances: Arc<RwLock<HashMap<String, Instance>>>,
}

impl ReferenceFleet {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, instance: Instance) {
        self.instances.write().insert(instance.id.clone(), instance);
    }

    pub fn get(&self, id: &str) -> Option<Instance> {
        self.instances.read().get(id).cloned()
    }

    pub fn set_current_state(&self, id: &str, state: CurrentState) {
        if let Some(instance) = self.instances.write().get_mut(id) {
            instance.current_state = state;
        }
    }
}

impl Default for ReferenceFleet {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`ServiceDriver`] over a [`ReferenceFleet`], generic over the opaque
/// session type `Sess` (ignored — this driver never makes a real call).
pub struct ReferenceServiceDriver<Sess> {
    service_name: String,
    allow_resize: bool,
    fleet: ReferenceFleet,
    _session: std::marker::PhantomData<Sess>,
}

impl<Sess> ReferenceServiceDriver<Sess> {
    pub fn new(service_name: impl Into<String>, allow_resize: bool, fleet: ReferenceFleet) -> Self {
        Self {
            service_name: service_name.into(),
            allow_resize,
            fleet,
            _session: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<Sess: Send + Sync> ServiceDriver<Sess> for ReferenceServiceDriver<Sess> {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn allow_resize(&self) -> bool {
        self.allow_resize
    }

    async fn get_schedulable_instances<'a>(
        &'a self,
        params: &'a DriverParams<Sess>,
    ) -> Result<BoxStream<'a, Instance>, DriverError> {
        let account = params.account.clone();
        let region = params.region.clone();
        let instances: Vec<Instance> = self
            .fleet
            .instances
            .read()
            .values()
            .filter(|i| i.account == account && i.region == region)
            .cloned()
            .collect();
        Ok(stream::iter(instances).boxed())
    }

    async fn start_instances<'a>(
        &'a self,
        _params: &'a DriverParams<Sess>,
        instance_ids: &'a [String],
    ) -> Result<BoxStream<'a, DriverStateUpdate>, DriverError> {
        let mut updates = Vec::with_capacity(instance_ids.len());
        for id in instance_ids {
            self.fleet.set_current_state(id, CurrentState::Running);
            updates.push(DriverStateUpdate {
                instance_id: id.clone(),
                state: CurrentState::Running,
            });
        }
        Ok(stream::iter(updates).boxed())
    }

    async fn stop_instances<'a>(
        &'a self,
        _params: &'a DriverParams<Sess>,
        instance_ids: &'a [String],
    ) -> Result<BoxStream<'a, DriverStateUpdate>, DriverError> {
        let mut updates = Vec::with_capacity(instance_ids.len());
        for id in instance_ids {
            self.fleet.set_current_state(id, CurrentState::Stopped);
            updates.push(DriverStateUpdate {
                instance_id: id.clone(),
                state: CurrentState::Stopped,
            });
        }
        Ok(stream::iter(updates).boxed())
    }

    async fn resize_instance(&self, params: &ResizeParams<Sess>) -> Result<(), DriverError> {
        let mut instances = self.fleet.instances.write();
        let Some(instance) = instances.get_mut(&params.instance_id) else {
            return Err(DriverError::ResizeFailed {
                instance_id: params.instance_id.clone(),
                target_type: params.desired_type.clone(),
                reason: "instance not found".to_string(),
            });
        };
        instance.machine_type = params.desired_type.clone();
        Ok(())
    }
}
