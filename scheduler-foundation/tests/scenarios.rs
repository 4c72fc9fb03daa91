//! Integration tests for the scheduling decision engine's testable
//! properties and concrete scenarios, built entirely against the
//! reference implementations in this crate plus a fixed clock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc};

use scheduler_foundation::{
    InMemoryStateStore, LoggingDeconfigureChannel, ReferenceFleet, ReferenceServiceDriver, RecordingDeconfigureChannel,
    StaticRoleAssumer, TracingMetricsSink,
};
use scheduler_kernel::{
    CurrentState, FixedClock, Instance, Period, PersistedState, RuntimeContext, Schedule, SchedulerConfiguration,
    SchedulingEngine,
};

fn office_hours_schedule(enforced: bool, retain_running: bool, stop_new_instances: bool) -> Schedule {
    let mut schedule = Schedule::new("office-hours", "UTC");
    schedule.enforced = enforced;
    schedule.retain_running = retain_running;
    schedule.stop_new_instances = stop_new_instances;
    schedule.periods.push(
        Period::new("business-hours")
            .with_time_range(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), NaiveTime::from_hms_opt(17, 0, 0).unwrap()),
    );
    schedule
}

fn base_config(schedules: HashMap<String, Schedule>, remote_accounts: &[&str]) -> SchedulerConfiguration {
    SchedulerConfiguration {
        scheduled_services: vec!["ec2".to_string()],
        schedule_clusters: false,
        regions: vec!["us-east-1".to_string()],
        schedule_lambda_account: false,
        remote_account_ids: remote_accounts.iter().map(|s| s.to_string()).collect(),
        default_timezone: "UTC".to_string(),
        trace: false,
        use_metrics: false,
        namespace: "fleet-ns".to_string(),
        aws_partition: "aws".to_string(),
        scheduler_role_name: "Ec2SchedulerRole".to_string(),
        create_rds_snapshot: false,
        enable_maintenance_windows: false,
        started_tags: HashMap::new(),
        stopped_tags: HashMap::new(),
        schedules,
    }
}

fn instance(id: &str, account: &str, state: CurrentState, machine_type: &str, schedule_name: &str) -> Instance {
    Instance {
        id: id.to_string(),
        display_name: None,
        service: "ec2".to_string(),
        account: account.to_string(),
        region: "us-east-1".to_string(),
        current_state: state,
        machine_type: machine_type.to_string(),
        allow_resize: true,
        schedule_name: schedule_name.to_string(),
        maintenance_window: None,
        tags: HashMap::new(),
        resized: false,
    }
}

fn runtime_context() -> RuntimeContext {
    RuntimeContext {
        stack_name: "fleet-scheduler".to_string(),
        host_account: "000000000000".to_string(),
        state_table_name: "scheduler-state".to_string(),
        user_agent_extra: None,
    }
}

fn engine_at(
    hour: u32,
    fleet: ReferenceFleet,
    assumer: StaticRoleAssumer<()>,
    deconfigure: Arc<dyn scheduler_kernel::DeconfigureChannel>,
) -> SchedulingEngine<()> {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 7, 27, hour, 0, 0).unwrap()));
    let driver = Arc::new(ReferenceServiceDriver::new("ec2", true, fleet));
    SchedulingEngine::new(clock, driver, Arc::new(assumer), deconfigure, Arc::new(TracingMetricsSink), "us-east-1")
}

#[tokio::test]
async fn s1_starts_instances_inside_the_scheduled_window() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));
    fleet.insert(instance("i-b", "222222222222", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, false, true));
    let config = base_config(schedules, &["111111111111", "222222222222"]);

    let assumer = StaticRoleAssumer::new((), ());
    let engine = engine_at(10, fleet, assumer, Arc::new(LoggingDeconfigureChannel));

    let mut store = InMemoryStateStore::new();
    let windows = HashMap::new();
    let result = engine.run(&config, &windows, &runtime_context(), &mut store).await.unwrap();

    let a = result.get("111111111111").unwrap();
    assert_eq!(a.started.get("us-east-1").unwrap().len(), 1);
    assert_eq!(a.started.get("us-east-1").unwrap()[0].id, "i-a");

    let b = result.get("222222222222").unwrap();
    assert_eq!(b.started.get("us-east-1").unwrap()[0].id, "i-b");

    let scope = scheduler_kernel::Scope::new("ec2", "111111111111", "us-east-1");
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Running);
}

#[tokio::test]
async fn s2_stops_running_instances_outside_window_when_not_retained() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));
    fleet.insert(instance("i-b", "222222222222", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, false, true));
    let config = base_config(schedules, &["111111111111", "222222222222"]);
    let mut store = InMemoryStateStore::new();

    // Cycle 1, 10:00 — starts both instances (S1).
    let engine = engine_at(10, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    // Cycle 2, 18:00 — both are now running (per cycle 1); schedule says stopped.
    let engine = engine_at(18, fleet, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    let a = result.get("111111111111").unwrap();
    assert_eq!(a.stopped.get("us-east-1").unwrap()[0].id, "i-a");

    let scope = scheduler_kernel::Scope::new("ec2", "111111111111", "us-east-1");
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Stopped);
}

#[tokio::test]
async fn s3_retain_running_suppresses_the_stop_then_converges_next_cycle() {
    // Retain-running only kicks in for a genuine manual override of an
    // instance the scheduler had already persisted as stopped — not for an
    // instance merely first observed running.
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, true, true));
    let config = base_config(schedules, &["111111111111"]);
    let mut store = InMemoryStateStore::new();
    let scope = scheduler_kernel::Scope::new("ec2", "111111111111", "us-east-1");

    // Night cycle, 22:00 — desired stopped, already stopped: persisted as
    // stopped, no driver call.
    let engine = engine_at(22, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    let a = result.get("111111111111").unwrap();
    assert!(a.stopped.is_empty());
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Stopped);

    // Started manually ahead of the office-hours window, outside the engine.
    fleet.set_current_state("i-a", CurrentState::Running);

    // Cycle 2, 10:00 — already running and desired running, with a persisted
    // `stopped` behind it: a genuine manual override, persisted as
    // retain_running, no driver call at all.
    let engine = engine_at(10, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    let a = result.get("111111111111").unwrap();
    assert!(a.started.is_empty());
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::RetainRunning);

    // Cycle 3, 18:00 — outside the window; retain_running persists stopped
    // without ever issuing a stop, so the reference fleet still reports the
    // instance running.
    let engine = engine_at(18, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    let a = result.get("111111111111").unwrap();
    assert!(a.stopped.is_empty());
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Stopped);
    assert_eq!(fleet.get("i-a").unwrap().current_state, CurrentState::Running);

    // Cycle 4, still 18:00 — persisted now equals desired (both stopped in
    // the bookkeeping sense); no further action.
    let engine = engine_at(18, fleet, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    let a = result.get("111111111111").unwrap();
    assert!(a.stopped.is_empty());
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Stopped);
}

#[tokio::test]
async fn s4_access_denied_deconfigures_remote_account_and_omits_it_from_result() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-host", "000000000000", CurrentState::Stopped, "m5.large", "office-hours"));
    fleet.insert(instance("i-remote", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, false, true));
    let mut config = base_config(schedules, &["111111111111"]);
    config.schedule_lambda_account = true;

    let assumer = StaticRoleAssumer::new((), ()).with_denied_accounts(["111111111111".to_string()]);
    let deconfigure = Arc::new(RecordingDeconfigureChannel::new());
    let engine = engine_at(10, fleet, assumer, deconfigure.clone());

    let mut store = InMemoryStateStore::new();
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    assert!(result.contains_key("000000000000"));
    assert!(!result.contains_key("111111111111"));

    let notices = deconfigure.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].account, "111111111111");
}

#[tokio::test]
async fn s5_unknown_schedule_skips_instance_without_creating_or_removing_state() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "missing"));

    let config = base_config(HashMap::new(), &["111111111111"]);
    let engine = engine_at(10, fleet, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));

    let mut store = InMemoryStateStore::new();
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    let a = result.get("111111111111").unwrap();
    assert!(a.started.is_empty());
    assert!(a.stopped.is_empty());

    let scope = scheduler_kernel::Scope::new("ec2", "111111111111", "us-east-1");
    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Unknown);
}

#[tokio::test]
async fn s6_resize_on_start_reports_both_start_and_resize() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedule = office_hours_schedule(false, false, true);
    schedule.periods[0] = schedule.periods[0].clone().with_instance_type("m5.xlarge");
    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), schedule);
    let config = base_config(schedules, &["111111111111"]);

    let engine = engine_at(10, fleet, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let mut store = InMemoryStateStore::new();
    let result = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    let a = result.get("111111111111").unwrap();
    assert_eq!(a.started.get("us-east-1").unwrap().len(), 1);
    let resized = a.resized.get("us-east-1").unwrap();
    assert_eq!(resized.len(), 1);
    assert_eq!(resized[0].old_type, "m5.large");
    assert_eq!(resized[0].new_type, "m5.xlarge");
}

#[tokio::test]
async fn idempotent_rerun_with_unchanged_inputs_produces_no_new_actions() {
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, false, true));
    let config = base_config(schedules, &["111111111111"]);
    let mut store = InMemoryStateStore::new();

    let engine = engine_at(10, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let first = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    assert_eq!(first.get("111111111111").unwrap().started.get("us-east-1").unwrap().len(), 1);

    // Driver marked the instance running after cycle 1; a second cycle at
    // the same instant with the same inputs must do nothing further.
    let engine = engine_at(10, fleet, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    let second = engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();
    let a = second.get("111111111111").unwrap();
    assert!(a.started.is_empty());
    assert!(a.stopped.is_empty());
    assert!(a.resized.is_empty());
}

#[tokio::test]
async fn cleanup_removes_records_for_instances_no_longer_observed() {
    // Two instances so the region's instance stream is never empty across
    // cycles — an entirely empty listing short-circuits before state is
    // loaded or saved at all, which would make this test vacuous.
    let fleet = ReferenceFleet::new();
    fleet.insert(instance("i-a", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));
    fleet.insert(instance("i-b", "111111111111", CurrentState::Stopped, "m5.large", "office-hours"));

    let mut schedules = HashMap::new();
    schedules.insert("office-hours".to_string(), office_hours_schedule(false, false, true));
    let config = base_config(schedules, &["111111111111"]);
    let mut store = InMemoryStateStore::new();
    let scope = scheduler_kernel::Scope::new("ec2", "111111111111", "us-east-1");

    let engine = engine_at(10, fleet.clone(), StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Running);
    assert_eq!(store.get("i-b"), PersistedState::Running);

    // i-a vanishes from the fleet entirely (e.g. terminated and reaped
    // outside the scheduler's view); i-b remains so the region is still
    // processed at all.
    let remaining = ReferenceFleet::new();
    remaining.insert(fleet.get("i-b").unwrap());
    let engine = engine_at(10, remaining, StaticRoleAssumer::new((), ()), Arc::new(LoggingDeconfigureChannel));
    engine.run(&config, &HashMap::new(), &runtime_context(), &mut store).await.unwrap();

    store.load(&scope).await.unwrap();
    assert_eq!(store.get("i-a"), PersistedState::Unknown);
    assert_eq!(store.get("i-b"), PersistedState::Running);
}
