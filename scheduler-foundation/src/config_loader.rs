//! Layered configuration loading for [`SchedulerConfiguration`] via the
//! `config` crate: a base file (TOML/YAML/JSON, detected by extension),
//! overridden by `SCHEDULER_`-prefixed environment variables.

use std::collections::HashMap;
use std::path::Path;

use scheduler_kernel::{is_empty_or_missing, ConfigError, SchedulerConfiguration};
use serde::Deserialize;

/// The on-disk/env shape deserialized before being lowered into
/// [`SchedulerConfiguration`]. Plain `Option`s here let [`load`] apply the
/// "empty or missing" rule explicitly rather than relying on `serde`
/// defaults, which would silently coerce an accidentally-omitted mandatory
/// field to a default value instead of surfacing [`ConfigError::MissingField`].
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    scheduled_services: Option<Vec<String>>,
    schedule_clusters: Option<bool>,
    regions: Option<Vec<String>>,
    schedule_lambda_account: Option<bool>,
    remote_account_ids: Option<Vec<String>>,
    default_timezone: Option<String>,
    trace: Option<bool>,
    use_metrics: Option<bool>,
    namespace: Option<String>,
    aws_partition: Option<String>,
    scheduler_role_name: Option<String>,
    create_rds_snapshot: Option<bool>,
    enable_maintenance_windows: Option<bool>,
    started_tags: Option<HashMap<String, String>>,
    stopped_tags: Option<HashMap<String, String>>,
}

/// Loads a [`SchedulerConfiguration`] from `path` (format inferred from its
/// extension), with any `SCHEDULER_*` environment variable overriding the
/// matching field (e.g. `SCHEDULER_NAMESPACE`, `SCHEDULER_TRACE`).
///
/// Schedules themselves are not part of this file — per §6 they are either
/// supplied in the invocation payload or loaded separately from the
/// configuration store; callers populate [`SchedulerConfiguration::schedules`]
/// after this call returns.
///
/// # Errors
/// [`ConfigError::MissingField`] if a mandatory field is empty or absent
/// after layering; this is the validation §7 calls `ConfigurationError`,
/// fatal for the whole cycle.
pub fn load(path: &Path) -> Result<SchedulerConfiguration, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("SCHEDULER").separator("_"));

    let settings = builder.build().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

    let raw: RawConfig = settings
        .try_deserialize()
        .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

    build_configuration(raw)
}

fn build_configuration(raw: RawConfig) -> Result<SchedulerConfiguration, ConfigError> {
    if is_empty_or_missing(&raw.namespace) {
        return Err(ConfigError::MissingField("namespace"));
    }
    if is_empty_or_missing(&raw.scheduler_role_name) {
        return Err(ConfigError::MissingField("scheduler_role_name"));
    }
    if is_empty_or_missing(&raw.default_timezone) {
        return Err(ConfigError::MissingField("default_timezone"));
    }

    Ok(SchedulerConfiguration {
        scheduled_services: raw.scheduled_services.unwrap_or_default(),
        schedule_clusters: raw.schedule_clusters.unwrap_or(false),
        regions: raw.regions.unwrap_or_default(),
        schedule_lambda_account: raw.schedule_lambda_account.unwrap_or(false),
        remote_account_ids: raw.remote_account_ids.unwrap_or_default(),
        default_timezone: raw.default_timezone.unwrap_or_default(),
        trace: raw.trace.unwrap_or(false),
        use_metrics: raw.use_metrics.unwrap_or(false),
        namespace: raw.namespace.unwrap_or_default(),
        aws_partition: raw.aws_partition.unwrap_or_else(|| "aws".to_string()),
        scheduler_role_name: raw.scheduler_role_name.unwrap_or_default(),
        create_rds_snapshot: raw.create_rds_snapshot.unwrap_or(false),
        enable_maintenance_windows: raw.enable_maintenance_windows.unwrap_or(false),
        started_tags: raw.started_tags.unwrap_or_default(),
        stopped_tags: raw.stopped_tags.unwrap_or_default(),
        schedules: HashMap::new(),
    })
}
