//! In-memory [`InstanceStateStore`] backed by a `DashMap`, keyed by scope
//! prefix and instance id. Suitable for tests, demos, and single-process
//! deployments; a hosted key-value table backend is a drop-in replacement.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use scheduler_kernel::{InstanceStateStore, PersistedState, Scope, StateStoreError};

/// Keeps every scope's records in one shared table, partitioned by
/// [`Scope::key_prefix`]. A single instance can back an entire process —
/// concurrent cycles for different scopes do not contend with each other
/// beyond the `DashMap`'s internal sharding.
pub struct InMemoryStateStore {
    table: Arc<DashMap<String, PersistedState>>,
    loaded_scope: Option<Scope>,
    /// The in-memory working set for `loaded_scope`, materialized by `load`
    /// and flushed back to `table` by `save`.
    working_set: std::collections::HashMap<String, PersistedState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            loaded_scope: None,
            working_set: std::collections::HashMap::new(),
        }
    }

    fn key(scope: &Scope, instance_id: &str) -> String {
        format!("{}.{instance_id}", scope.key_prefix())
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceStateStore for InMemoryStateStore {
    async fn load(&mut self, scope: &Scope) -> Result<(), StateStoreError> {
        let prefix = format!("{}.", scope.key_prefix());
        self.working_set = self
            .table
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| {
                let instance_id = entry.key()[prefix.len()..].to_string();
                (instance_id, *entry.value())
            })
            .collect();
        self.loaded_scope = Some(scope.clone());
        Ok(())
    }

    fn get(&self, instance_id: &str) -> PersistedState {
        self.working_set
            .get(instance_id)
            .copied()
            .unwrap_or(PersistedState::Unknown)
    }

    fn set(&mut self, instance_id: &str, state: PersistedState) {
        self.working_set.insert(instance_id.to_string(), state);
    }

    fn delete(&mut self, instance_id: &str) {
        self.working_set.remove(instance_id);
    }

    fn cleanup(&mut self, observed_ids: &HashSet<String>) {
        self.working_set.retain(|id, _| observed_ids.contains(id));
    }

    async fn save(&mut self) -> Result<(), StateStoreError> {
        let Some(scope) = self.loaded_scope.clone() else {
            return Ok(());
        };
        let prefix = format!("{}.", scope.key_prefix());
        self.table.retain(|key, _| !key.starts_with(&prefix));
        for (instance_id, state) in &self.working_set {
            self.table.insert(Self::key(&scope, instance_id), *state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_after_save_restores_the_working_set() {
        let mut store = InMemoryStateStore::new();
        let scope = Scope::new("ec2", "111122223333", "us-east-1");

        store.load(&scope).await.unwrap();
        store.set("i-1", PersistedState::Running);
        store.set("i-2", PersistedState::Stopped);
        store.save().await.unwrap();

        let mut reloaded = InMemoryStateStore {
            table: store.table.clone(),
            loaded_scope: None,
            working_set: std::collections::HashMap::new(),
        };
        reloaded.load(&scope).await.unwrap();
        assert_eq!(reloaded.get("i-1"), PersistedState::Running);
        assert_eq!(reloaded.get("i-2"), PersistedState::Stopped);
    }

    #[tokio::test]
    async fn cleanup_removes_unobserved_records() {
        let mut store = InMemoryStateStore::new();
        let scope = Scope::new("ec2", "111122223333", "us-east-1");
        store.load(&scope).await.unwrap();
        store.set("i-1", PersistedState::Running);
        store.set("i-2", PersistedState::Stopped);

        let observed = HashSet::from(["i-1".to_string()]);
        store.cleanup(&observed);

        assert_eq!(store.get("i-1"), PersistedState::Running);
        assert_eq!(store.get("i-2"), PersistedState::Unknown);
    }

    #[tokio::test]
    async fn get_is_unknown_for_absent_instance() {
        let mut store = InMemoryStateStore::new();
        let scope = Scope::new("ec2", "111122223333", "us-east-1");
        store.load(&scope).await.unwrap();
        assert_eq!(store.get("i-absent"), PersistedState::Unknown);
    }

    #[tokio::test]
    async fn scopes_do_not_leak_into_each_other() {
        let mut store = InMemoryStateStore::new();
        let scope_a = Scope::new("ec2", "111111111111", "us-east-1");
        let scope_b = Scope::new("ec2", "222222222222", "us-east-1");

        store.load(&scope_a).await.unwrap();
        store.set("i-1", PersistedState::Running);
        store.save().await.unwrap();

        store.load(&scope_b).await.unwrap();
        assert_eq!(store.get("i-1"), PersistedState::Unknown);
    }
}
