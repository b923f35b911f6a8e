//! In-memory [`ObjectStore`] for unit tests.
//!
//! Emulates the API server behaviour the reconcilers rely on: generated
//! names, UIDs, resource versions with conflict detection, label-filtered
//! listing in name order, and deletion deferred until finalizers are gone.

use super::{ObjectStore, StoreError};
use crds::{Instance, POOL_NAME_LABEL, Pool};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    pools: BTreeMap<String, Pool>,
    instances: BTreeMap<String, Instance>,
    nodes: BTreeMap<String, Node>,
    version: u64,
    writes: usize,
    failing_creates: usize,
    fail_updates: bool,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

fn deletion_time() -> Option<Time> {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).ok()
}

fn has_finalizers(meta: &ObjectMeta) -> bool {
    meta.finalizers.as_ref().is_some_and(|f| !f.is_empty())
}

impl MockState {
    fn stamp(&mut self, meta: &mut ObjectMeta) {
        self.version += 1;
        meta.resource_version = Some(self.version.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
    }

    fn check_version(
        kind: &'static str,
        name: &str,
        stored: &ObjectMeta,
        incoming: &ObjectMeta,
    ) -> Result<(), StoreError> {
        match (&stored.resource_version, &incoming.resource_version) {
            (Some(a), Some(b)) if a != b => Err(StoreError::Conflict {
                kind,
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a Pool; returns the stored copy
    pub fn insert_pool(&self, mut pool: Pool) -> Pool {
        let mut state = self.state();
        state.stamp(&mut pool.metadata);
        let name = pool.metadata.name.clone().unwrap_or_default();
        state.pools.insert(name, pool.clone());
        pool
    }

    /// Seed an Instance; returns the stored copy
    pub fn insert_instance(&self, mut instance: Instance) -> Instance {
        let mut state = self.state();
        state.stamp(&mut instance.metadata);
        let name = instance.metadata.name.clone().unwrap_or_default();
        state.instances.insert(name, instance.clone());
        instance
    }

    /// Seed a Node
    pub fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.state().nodes.insert(name, node);
    }

    /// Remove a Node behind the controller's back
    pub fn remove_node(&self, name: &str) {
        self.state().nodes.remove(name);
    }

    pub fn pool(&self, name: &str) -> Option<Pool> {
        self.state().pools.get(name).cloned()
    }

    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.state().instances.get(name).cloned()
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.state().instances.values().cloned().collect()
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state().nodes.get(name).cloned()
    }

    /// Number of successful writes (create, update, delete)
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Fail the next `count` Instance creations
    pub fn fail_next_creates(&self, count: usize) {
        self.state().failing_creates = count;
    }

    /// Fail every update
    pub fn fail_updates(&self, fail: bool) {
        self.state().fail_updates = fail;
    }

    /// Request deletion of a Pool the way `kubectl delete` would
    pub fn request_pool_deletion(&self, name: &str) {
        let mut state = self.state();
        let Some(pool) = state.pools.get_mut(name) else {
            return;
        };
        if has_finalizers(&pool.metadata) {
            pool.metadata.deletion_timestamp = deletion_time();
        } else {
            state.pools.remove(name);
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.pool(name))
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, StoreError> {
        let mut state = self.state();
        let name = pool.metadata.name.clone().unwrap_or_default();
        if state.fail_updates {
            return Err(StoreError::Backend(format!("injected update failure for Pool {name}")));
        }
        let Some(stored) = state.pools.get(&name) else {
            return Err(StoreError::NotFound { kind: "Pool", name });
        };
        MockState::check_version("Pool", &name, &stored.metadata, &pool.metadata)?;

        let mut updated = pool.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        state.stamp(&mut updated.metadata);
        state.writes += 1;

        if updated.metadata.deletion_timestamp.is_some() && !has_finalizers(&updated.metadata) {
            state.pools.remove(&name);
        } else {
            state.pools.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn list_instances(&self, pool: &str) -> Result<Vec<Instance>, StoreError> {
        Ok(self
            .state()
            .instances
            .values()
            .filter(|i| i.pool_name() == Some(pool))
            .cloned()
            .collect())
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, StoreError> {
        Ok(self.instance(name))
    }

    async fn create_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let mut state = self.state();
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(StoreError::Backend("injected create failure".to_string()));
        }

        let mut created = instance.clone();
        if created.metadata.name.is_none() {
            let prefix = created.metadata.generate_name.clone().unwrap_or_default();
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            created.metadata.name = Some(format!("{prefix}{}", &suffix[..5]));
        }
        let name = created.metadata.name.clone().unwrap_or_default();
        if state.instances.contains_key(&name) {
            return Err(StoreError::Conflict {
                kind: "Instance",
                name,
            });
        }
        created.metadata.uid = None;
        state.stamp(&mut created.metadata);
        state.writes += 1;
        state.instances.insert(name, created.clone());
        Ok(created)
    }

    async fn update_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let mut state = self.state();
        let name = instance.metadata.name.clone().unwrap_or_default();
        if state.fail_updates {
            return Err(StoreError::Backend(format!("injected update failure for Instance {name}")));
        }
        let Some(stored) = state.instances.get(&name) else {
            return Err(StoreError::NotFound {
                kind: "Instance",
                name,
            });
        };
        MockState::check_version("Instance", &name, &stored.metadata, &instance.metadata)?;

        let mut updated = instance.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        state.stamp(&mut updated.metadata);
        state.writes += 1;

        if updated.metadata.deletion_timestamp.is_some() && !has_finalizers(&updated.metadata) {
            state.instances.remove(&name);
        } else {
            state.instances.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn delete_instance(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        let Some(instance) = state.instances.get_mut(name) else {
            return Ok(());
        };
        if has_finalizers(&instance.metadata) {
            if instance.metadata.deletion_timestamp.is_none() {
                instance.metadata.deletion_timestamp = deletion_time();
            }
        } else {
            state.instances.remove(name);
        }
        state.writes += 1;
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.node(name))
    }

    async fn delete_node(&self, name: &str) -> Result<(), StoreError> {
        self.state().nodes.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_instance, create_test_pool};

    #[tokio::test]
    async fn test_finalizer_defers_deletion() {
        let store = MockStore::new();
        let mut instance = create_test_instance("workers-a", "workers");
        instance.metadata.finalizers = Some(vec![crds::INSTANCE_FINALIZER.to_string()]);
        store.insert_instance(instance);

        store.delete_instance("workers-a").await.unwrap();
        let pending = store.instance("workers-a").unwrap();
        assert!(pending.deletion_requested());

        let mut cleared = pending.clone();
        cleared.metadata.finalizers = Some(vec![]);
        store.update_instance(&cleared).await.unwrap();
        assert!(store.instance("workers-a").is_none());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MockStore::new();
        let pool = store.insert_pool(create_test_pool("workers", 1));

        let mut first = pool.clone();
        first.spec.replicas = 2;
        store.update_pool(&first).await.unwrap();

        let mut stale = pool;
        stale.spec.replicas = 3;
        let err = store.update_pool(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_generated_names_and_label_filter() {
        let store = MockStore::new();
        let mut template = create_test_instance("ignored", "workers");
        template.metadata.name = None;
        template.metadata.generate_name = Some("workers-".to_string());

        let created = store.create_instance(&template).await.unwrap();
        let name = created.metadata.name.clone().unwrap();
        assert!(name.starts_with("workers-"));
        assert_eq!(name.len(), "workers-".len() + 5);
        assert!(created.metadata.uid.is_some());

        store.insert_instance(create_test_instance("other-a", "other"));
        assert_eq!(store.list_instances("workers").await.unwrap().len(), 1);
    }
}
