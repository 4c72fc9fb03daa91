//! Scheduler configuration — the mapping, regions, schedules, and tag
//! templates that drive a cycle.
//!
//! Loading from TOML/YAML/JSON/env is the foundation crate's job (via the
//! `config` crate); this module defines the shape and the pure helpers
//! (emptiness checks, tag-template expansion) that shape depends on.

use std::collections::HashMap;

use thiserror::Error;

use crate::schedule::Schedule;

/// Errors building or validating a [`SchedulerConfiguration`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
    #[error("missing mandatory field '{0}'")]
    MissingField(&'static str),
    #[error("tag template references unknown variable '{0}'")]
    UnknownTemplateVariable(String),
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Returns true when `value` is the "empty or missing" sentinel the source
/// system's config constructor conflates with falsy: `None` or `""`.
///
/// Deliberately distinct from a truthy/falsy check — `Some("0")` and
/// `Some("false")` are meaningful, non-empty values and must not be treated
/// as absent. This is the explicit fix for the `in ["" or None]` bug noted
/// in the design notes.
pub fn is_empty_or_missing(value: &Option<String>) -> bool {
    match value {
        None => true,
        Some(s) => s.is_empty(),
    }
}

/// The full scheduler configuration for one invocation.
#[derive(Debug, Clone)]
pub struct SchedulerConfiguration {
    pub scheduled_services: Vec<String>,
    pub schedule_clusters: bool,
    /// Empty means "home region only".
    pub regions: Vec<String>,
    pub schedule_lambda_account: bool,
    pub remote_account_ids: Vec<String>,
    pub default_timezone: String,
    pub trace: bool,
    pub use_metrics: bool,
    pub namespace: String,
    pub aws_partition: String,
    pub scheduler_role_name: String,
    pub create_rds_snapshot: bool,
    pub enable_maintenance_windows: bool,
    pub started_tags: HashMap<String, String>,
    pub stopped_tags: HashMap<String, String>,
    pub schedules: HashMap<String, Schedule>,
}

impl SchedulerConfiguration {
    /// Validates the mandatory fields are present and non-empty, applying
    /// [`is_empty_or_missing`] rather than a truthy/falsy check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_empty_or_missing(&Some(self.namespace.clone())) {
            return Err(ConfigError::MissingField("namespace"));
        }
        if is_empty_or_missing(&Some(self.scheduler_role_name.clone())) {
            return Err(ConfigError::MissingField("scheduler_role_name"));
        }
        if is_empty_or_missing(&Some(self.default_timezone.clone())) {
            return Err(ConfigError::MissingField("default_timezone"));
        }
        Ok(())
    }

    /// Resolves the regions to use for a cycle: the configured list, or
    /// `[home_region]` when empty (§8 boundary behavior).
    pub fn effective_regions<'a>(&'a self, home_region: &'a str) -> Vec<&'a str> {
        if self.regions.is_empty() {
            vec![home_region]
        } else {
            self.regions.iter().map(String::as_str).collect()
        }
    }
}

/// Built-in variables available to every tag template, independent of
/// caller-supplied ones.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub scheduler: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub timezone: String,
}

impl TemplateContext {
    fn builtin(&self, name: &str) -> Option<&str> {
        match name {
            "scheduler" => Some(&self.scheduler),
            "year" => Some(&self.year),
            "month" => Some(&self.month),
            "day" => Some(&self.day),
            "hour" => Some(&self.hour),
            "minute" => Some(&self.minute),
            "timezone" => Some(&self.timezone),
            _ => None,
        }
    }
}

/// Expands `{var}` placeholders in `template` using `context`'s built-ins
/// first, falling back to `extra`. A single left-to-right pass: a
/// substituted value is never itself re-scanned for further placeholders,
/// per the design notes' resolution of the source's undefined iteration
/// order.
///
/// # Errors
/// Returns [`ConfigError::UnknownTemplateVariable`] if a `{var}` has no
/// match in either source.
pub fn expand_tag_template(
    template: &str,
    context: &TemplateContext,
    extra: &HashMap<String, String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let var = &template[i + 1..i + end];
                let value = context
                    .builtin(var)
                    .or_else(|| extra.get(var).map(String::as_str))
                    .ok_or_else(|| ConfigError::UnknownTemplateVariable(var.to_string()))?;
                out.push_str(value);
                i += end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

/// Expands every value in `tags` through [`expand_tag_template`], skipping
/// keys reserved by the cloud provider itself (`aws:`, `cloudformation:`
/// prefixes) since those are never user-assignable.
pub fn expand_tag_list(
    tags: &HashMap<String, String>,
    context: &TemplateContext,
    extra: &HashMap<String, String>,
) -> Result<HashMap<String, String>, ConfigError> {
    tags.iter()
        .filter(|(k, _)| !k.starts_with("aws:") && !k.starts_with("cloudformation:"))
        .map(|(k, v)| expand_tag_template(v, context, extra).map(|expanded| (k.clone(), expanded)))
        .collect()
}
