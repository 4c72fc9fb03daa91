//! Scheduling decision engine — the per-cycle orchestrator (§4.5).
//!
//! Walks accounts, then regions, then instances; resolves each instance's
//! desired state against its persisted state via the state machine in
//! [`decide_action`]; commits start/stop/resize batches through the
//! service driver; and persists the outcome.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::StreamExt;
use tracing::{info_span, warn, Instrument};

use crate::clock::Clock;
use crate::config::SchedulerConfiguration;
use crate::driver::{DriverParams, ResizeParams, ServiceDriver};
use crate::error::KernelError;
use crate::metrics::{MetricsSink, SchedulerMetrics, UsageCounters};
use crate::schedule::{desired_state_for_instance, MaintenanceWindow, Schedule};
use crate::session::{accounts, Account, AccountListing, RoleAssumer};
use crate::state_store::InstanceStateStore;
use crate::types::{DesiredState, Instance, PersistedState, Scope};

/// A single started or stopped instance, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub schedule: String,
}

/// A single resized instance, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResizeRecord {
    pub id: String,
    pub schedule: String,
    pub old_type: String,
    pub new_type: String,
}

/// Per-account outcome of a cycle, keyed by region.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountResult {
    pub started: HashMap<String, Vec<ActionRecord>>,
    pub stopped: HashMap<String, Vec<ActionRecord>>,
    pub resized: HashMap<String, Vec<ResizeRecord>>,
}

/// `account_name → AccountResult`, the public result of [`SchedulingEngine::run`].
pub type ResultMap = HashMap<String, AccountResult>;

/// Process-wide settings resolved once at the boundary and threaded through
/// a cycle, replacing the source system's module-load-time environment
/// reads (§9 design note).
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub stack_name: String,
    pub host_account: String,
    pub state_table_name: String,
    pub user_agent_extra: Option<String>,
}

/// The per-instance decision produced by the §4.5.1 state machine, before
/// any driver call has been attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    /// Nothing changes this cycle; no persisted-state write either.
    NoOp,
    /// Persist a new state without touching the driver (e.g. grace period,
    /// retain-running, already-converged).
    PersistOnly(PersistedState),
    /// Add to the start batch, optionally resizing first.
    Start { resize_to: Option<String> },
    /// Add to the stop batch.
    Stop { for_resize: bool },
}

fn resize_warranted(desired_type: Option<&str>, instance: &Instance, driver_allow_resize: bool) -> bool {
    match desired_type {
        Some(t) => t != instance.machine_type && instance.allow_resize && driver_allow_resize,
        None => false,
    }
}

/// Whether a resize was requested by the schedule but cannot be honored —
/// used only to decide whether to log a warning; the start still proceeds.
fn resize_pinned_but_unsupported(desired_type: Option<&str>, instance: &Instance, driver_allow_resize: bool) -> bool {
    match desired_type {
        Some(t) => t != instance.machine_type && !(instance.allow_resize && driver_allow_resize),
        None => false,
    }
}

/// A persisted state is considered equal to a desired state only for the
/// two states that share meaning (`running`/`stopped`); `stopped_for_resize`
/// is deliberately never equal to anything persisted, so it always drives a
/// new transition even if the instance is already stopped.
fn persisted_matches_desired(last: PersistedState, desired: DesiredState) -> bool {
    matches!(
        (last, desired),
        (PersistedState::Running, DesiredState::Running) | (PersistedState::Stopped, DesiredState::Stopped)
    )
}

fn new_state_transition(
    last: PersistedState,
    desired: DesiredState,
    desired_type: Option<&str>,
    instance: &Instance,
    schedule: &Schedule,
    driver_allow_resize: bool,
) -> Decision {
    match desired {
        DesiredState::Running => {
            if !instance.is_running() {
                let resize_to = if resize_warranted(desired_type, instance, driver_allow_resize) {
                    desired_type.map(str::to_string)
                } else {
                    None
                };
                Decision::Start { resize_to }
            } else if schedule.retain_running && last == PersistedState::Stopped {
                // Only a genuine manual override of a stopped, persisted
                // instance is retained; a first sighting (`Unknown`) is not.
                Decision::PersistOnly(PersistedState::RetainRunning)
            } else {
                Decision::PersistOnly(PersistedState::Running)
            }
        }
        DesiredState::Stopped | DesiredState::StoppedForResize => {
            if instance.is_running() {
                Decision::Stop {
                    for_resize: desired == DesiredState::StoppedForResize,
                }
            } else {
                Decision::PersistOnly(PersistedState::Stopped)
            }
        }
        DesiredState::Any => Decision::NoOp,
    }
}

/// The §4.5.1 per-instance state machine. `last` is the persisted state read
/// from the store before this cycle; the return value says what to do and,
/// where applicable, what to persist immediately (driver-bound decisions
/// persist only after the batch commit succeeds, see [`SchedulingEngine::process_region`]).
fn decide_action(
    last: PersistedState,
    desired: DesiredState,
    desired_type: Option<&str>,
    instance: &Instance,
    schedule: &Schedule,
    driver_allow_resize: bool,
) -> Decision {
    match last {
        PersistedState::Unknown => {
            if instance.is_running() && desired == DesiredState::Stopped && !schedule.stop_new_instances {
                Decision::PersistOnly(PersistedState::Stopped)
            } else {
                new_state_transition(last, desired, desired_type, instance, schedule, driver_allow_resize)
            }
        }
        PersistedState::RetainRunning => match desired {
            DesiredState::Running => Decision::NoOp,
            DesiredState::Stopped | DesiredState::StoppedForResize => Decision::PersistOnly(PersistedState::Stopped),
            DesiredState::Any => Decision::NoOp,
        },
        PersistedState::Running | PersistedState::Stopped => {
            let enforced_trigger = schedule.enforced
                && ((instance.is_running() && desired == DesiredState::Stopped)
                    || (!instance.is_running() && desired == DesiredState::Running));
            if enforced_trigger || !persisted_matches_desired(last, desired) {
                new_state_transition(last, desired, desired_type, instance, schedule, driver_allow_resize)
            } else {
                Decision::NoOp
            }
        }
    }
}

struct PendingStart {
    instance: Instance,
    resize_to: Option<String>,
}

struct PendingStop {
    instance: Instance,
}

/// Outcome of processing one `(account, region)` scope, before being folded
/// into the cycle-wide [`ResultMap`].
#[derive(Debug, Default)]
struct RegionOutcome {
    started: Vec<ActionRecord>,
    stopped: Vec<ActionRecord>,
    resized: Vec<ResizeRecord>,
}

/// The orchestrator described in §4.5. `Sess` is the opaque session type
/// produced by the configured [`RoleAssumer`].
pub struct SchedulingEngine<Sess> {
    clock: Arc<dyn Clock>,
    driver: Arc<dyn ServiceDriver<Sess>>,
    assumer: Arc<dyn RoleAssumer<Sess>>,
    deconfigure: Arc<dyn crate::bus::DeconfigureChannel>,
    metrics_sink: Arc<dyn MetricsSink>,
    home_region: String,
}

impl<Sess: Clone + Send + Sync + 'static> SchedulingEngine<Sess> {
    pub fn new(
        clock: Arc<dyn Clock>,
        driver: Arc<dyn ServiceDriver<Sess>>,
        assumer: Arc<dyn RoleAssumer<Sess>>,
        deconfigure: Arc<dyn crate::bus::DeconfigureChannel>,
        metrics_sink: Arc<dyn MetricsSink>,
        home_region: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            driver,
            assumer,
            deconfigure,
            metrics_sink,
            home_region: home_region.into(),
        }
    }

    /// Runs one full cycle for this engine's service, per §4.5 steps 1-4.
    ///
    /// # Errors
    /// Only a [`KernelError::Config`] from a failed [`SchedulerConfiguration::validate`]
    /// aborts the entire cycle; every other failure is localized per §7 and
    /// reflected as a missing/partial entry in the returned [`ResultMap`].
    pub async fn run(
        &self,
        config: &SchedulerConfiguration,
        windows: &HashMap<String, MaintenanceWindow>,
        context: &RuntimeContext,
        state_store: &mut dyn InstanceStateStore,
    ) -> Result<ResultMap, KernelError> {
        config.validate().map_err(KernelError::from)?;

        let span = info_span!("scheduler_cycle", stack = %context.stack_name, host_account = %context.host_account, service = %self.driver.service_name());
        async {
            let mut result_map = ResultMap::new();
            let mut usage = UsageCounters::new();
            let mut schedule_metrics = SchedulerMetrics::new(self.clock.now_utc());

            let listing = AccountListing {
                schedule_lambda_account: config.schedule_lambda_account,
                host_account: context.host_account.clone(),
                remote_account_ids: config.remote_account_ids.clone(),
                aws_partition: config.aws_partition.clone(),
                namespace: config.namespace.clone(),
                scheduler_role_name: config.scheduler_role_name.clone(),
                service: self.driver.service_name().to_string(),
            };

            let mut account_stream =
                Box::pin(accounts(listing, self.assumer.clone(), self.deconfigure.clone()));

            while let Some(account) = account_stream.next().await {
                let account_result = self
                    .process_account(&account, config, windows, &mut schedule_metrics, &mut usage, state_store)
                    .await;
                result_map.insert(account.name.clone(), account_result);
            }

            if config.use_metrics {
                let hits = schedule_metrics.into_hits();
                self.metrics_sink.flush_schedule_metrics(&hits).await;
            }
            self.metrics_sink
                .publish_usage_counters(self.driver.service_name(), &usage)
                .await;

            Ok(result_map)
        }
        .instrument(span)
        .await
    }

    async fn process_account(
        &self,
        account: &Account<Sess>,
        config: &SchedulerConfiguration,
        windows: &HashMap<String, MaintenanceWindow>,
        schedule_metrics: &mut SchedulerMetrics,
        usage: &mut UsageCounters,
        state_store: &mut dyn InstanceStateStore,
    ) -> AccountResult {
        let mut result = AccountResult::default();
        let regions = config.effective_regions(&self.home_region);

        for region in regions {
            match self
                .process_region(account, region, config, windows, schedule_metrics, usage, state_store)
                .await
            {
                Ok(outcome) => {
                    if !outcome.started.is_empty() {
                        result.started.insert(region.to_string(), outcome.started);
                    }
                    if !outcome.stopped.is_empty() {
                        result.stopped.insert(region.to_string(), outcome.stopped);
                    }
                    if !outcome.resized.is_empty() {
                        result.resized.insert(region.to_string(), outcome.resized);
                    }
                }
                Err(reason) => {
                    warn!(account = %account.name, %region, %reason, "skipping region scope for this cycle");
                }
            }
        }

        result
    }

    async fn process_region(
        &self,
        account: &Account<Sess>,
        region: &str,
        config: &SchedulerConfiguration,
        windows: &HashMap<String, MaintenanceWindow>,
        schedule_metrics: &mut SchedulerMetrics,
        usage: &mut UsageCounters,
        state_store: &mut dyn InstanceStateStore,
    ) -> Result<RegionOutcome, String> {
        let scope = Scope::new(self.driver.service_name(), account.name.clone(), region.to_string());
        let driver_allow_resize = self.driver.allow_resize();

        let list_params = DriverParams {
            session: account.session.clone(),
            account: account.name.clone(),
            role: account.role.clone(),
            region: region.to_string(),
            trace: config.trace,
        };

        let mut instances = self
            .driver
            .get_schedulable_instances(&list_params)
            .await
            .map_err(|e| e.to_string())?;

        let mut loaded = false;
        let mut observed_ids: HashSet<String> = HashSet::new();
        let mut pending_starts: Vec<PendingStart> = Vec::new();
        let mut pending_stops: Vec<PendingStop> = Vec::new();

        while let Some(instance) = instances.next().await {
            if !loaded {
                state_store.load(&scope).await.map_err(|e| e.to_string())?;
                loaded = true;
            }

            if instance.is_terminated() {
                state_store.delete(&instance.id);
                continue;
            }

            observed_ids.insert(instance.id.clone());

            let schedule = match config.schedules.get(&instance.schedule_name) {
                Some(schedule) => schedule,
                None => {
                    warn!(instance = %instance.display_string(), schedule = %instance.schedule_name, "unknown schedule, skipping instance");
                    continue;
                }
            };

            let (desired_state, desired_type, period_name) =
                match desired_state_for_instance(schedule, &instance, self.clock.as_ref(), windows) {
                    Ok(result) => result,
                    Err(reason) => {
                        warn!(instance = %instance.display_string(), %reason, "schedule evaluation failed, skipping instance");
                        continue;
                    }
                };

            if resize_pinned_but_unsupported(desired_type.as_deref(), &instance, driver_allow_resize) {
                warn!(
                    instance = %instance.display_string(),
                    desired_type = desired_type.as_deref().unwrap_or_default(),
                    "resize pinned by schedule but unsupported here, starting without resize"
                );
            }

            schedule_metrics.record_hit(&schedule.name, period_name.as_deref());

            let last = state_store.get(&instance.id);
            let decision = decide_action(last, desired_state, desired_type.as_deref(), &instance, schedule, driver_allow_resize);

            match decision {
                Decision::NoOp => {}
                Decision::PersistOnly(state) => state_store.set(&instance.id, state),
                Decision::Start { resize_to } => pending_starts.push(PendingStart {
                    instance: instance.clone(),
                    resize_to,
                }),
                Decision::Stop { for_resize } => {
                    let mut stopping = instance.clone();
                    stopping.resized = for_resize;
                    pending_stops.push(PendingStop { instance: stopping });
                }
            }
        }

        if !loaded {
            return Ok(RegionOutcome::default());
        }

        let mut outcome = RegionOutcome::default();
        let mut resize_failed: HashSet<String> = HashSet::new();

        for pending in &pending_starts {
            let Some(target_type) = &pending.resize_to else { continue };
            let resize_params = ResizeParams {
                common: DriverParams {
                    session: account.session.clone(),
                    account: account.name.clone(),
                    role: account.role.clone(),
                    region: region.to_string(),
                    trace: config.trace,
                },
                instance_id: pending.instance.id.clone(),
                desired_type: target_type.clone(),
            };
            match self.driver.resize_instance(&resize_params).await {
                Ok(()) => {
                    outcome.resized.push(ResizeRecord {
                        id: pending.instance.id.clone(),
                        schedule: pending.instance.schedule_name.clone(),
                        old_type: pending.instance.machine_type.clone(),
                        new_type: target_type.clone(),
                    });
                    usage.record_resized(&pending.instance.machine_type, target_type);
                }
                Err(reason) => {
                    warn!(instance = %pending.instance.display_string(), %reason, "resize failed, excluding from start batch this cycle");
                    resize_failed.insert(pending.instance.id.clone());
                }
            }
        }

        let start_ids: Vec<String> = pending_starts
            .iter()
            .filter(|p| !resize_failed.contains(&p.instance.id))
            .map(|p| p.instance.id.clone())
            .collect();

        if !start_ids.is_empty() {
            let params = DriverParams {
                session: account.session.clone(),
                account: account.name.clone(),
                role: account.role.clone(),
                region: region.to_string(),
                trace: config.trace,
            };
            let mut updates = self
                .driver
                .start_instances(&params, &start_ids)
                .await
                .map_err(|e| e.to_string())?;

            while let Some(update) = updates.next().await {
                let Some(pending) = pending_starts.iter().find(|p| p.instance.id == update.instance_id) else {
                    continue;
                };
                state_store.set(&update.instance_id, PersistedState::from_driver_state(update.state));
                let machine_type = pending
                    .resize_to
                    .clone()
                    .unwrap_or_else(|| pending.instance.machine_type.clone());
                usage.record_started(&machine_type);
                outcome.started.push(ActionRecord {
                    id: update.instance_id,
                    schedule: pending.instance.schedule_name.clone(),
                });
            }
        }

        if !pending_stops.is_empty() {
            let stop_ids: Vec<String> = pending_stops.iter().map(|p| p.instance.id.clone()).collect();
            let params = DriverParams {
                session: account.session.clone(),
                account: account.name.clone(),
                role: account.role.clone(),
                region: region.to_string(),
                trace: config.trace,
            };
            let mut updates = self
                .driver
                .stop_instances(&params, &stop_ids)
                .await
                .map_err(|e| e.to_string())?;

            while let Some(update) = updates.next().await {
                let Some(pending) = pending_stops.iter().find(|p| p.instance.id == update.instance_id) else {
                    continue;
                };
                state_store.set(&update.instance_id, PersistedState::from_driver_state(update.state));
                usage.record_stopped(&pending.instance.machine_type);
                outcome.stopped.push(ActionRecord {
                    id: update.instance_id,
                    schedule: pending.instance.schedule_name.clone(),
                });
            }
        }

        state_store.cleanup(&observed_ids);
        state_store.save().await.map_err(|e| e.to_string())?;

        Ok(outcome)
    }
}
