//! Instance-state store contract — a keyed persistence of the last desired
//! state recorded per instance, scoped by `(service, account, region)`.
//!
//! Concrete backends (in-memory, hosted key-value table, ...) live in the
//! foundation crate; this module only defines the trait and the scoping
//! rules every backend must honor.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PersistedState, Scope};

/// Errors reading or persisting instance state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateStoreError {
    #[error("failed to load state for {0}: {1}")]
    LoadFailed(Scope, String),
    #[error("failed to save state for {0}: {1}")]
    SaveFailed(Scope, String),
}

/// A keyed persistence of [`PersistedState`] records for one
/// `(service, account, region)` [`Scope`] at a time.
///
/// # Guarantees
///
/// Reads after [`InstanceStateStore::load`] and before
/// [`InstanceStateStore::save`] are coherent with the in-memory view;
/// `save` is all-or-nothing from the perspective of the next cycle. Only one
/// engine cycle per scope runs at a time — enforced by the caller, not this
/// trait.
#[async_trait]
pub trait InstanceStateStore: Send + Sync {
    /// Fetches all records whose key matches `scope` into memory, replacing
    /// any previously loaded scope.
    ///
    /// # Errors
    /// Returns [`StateStoreError::LoadFailed`] on a backend read failure.
    /// Per §7 this is fatal for the `(account, region)` scope: callers must
    /// skip the scope rather than proceed with a partial view.
    async fn load(&mut self, scope: &Scope) -> Result<(), StateStoreError>;

    /// The last desired state recorded for `instance_id` in the currently
    /// loaded scope, or [`PersistedState::Unknown`] if absent.
    fn get(&self, instance_id: &str) -> PersistedState;

    /// Records `state` for `instance_id` in the in-memory snapshot. Not
    /// durable until [`InstanceStateStore::save`] is called.
    fn set(&mut self, instance_id: &str, state: PersistedState);

    /// Removes any in-memory record for `instance_id`.
    fn delete(&mut self, instance_id: &str);

    /// Removes any in-memory record whose id is not present in
    /// `observed_ids` — instances that vanished since the last cycle.
    fn cleanup(&mut self, observed_ids: &HashSet<String>);

    /// Atomically persists the in-memory snapshot for the currently loaded
    /// scope.
    ///
    /// # Errors
    /// Returns [`StateStoreError::SaveFailed`] on a backend write failure.
    /// Per §7 this is fatal for the scope: no partial save, the next cycle
    /// will re-derive state from scratch.
    async fn save(&mut self) -> Result<(), StateStoreError>;
}
