//! [`ObjectStore`] backed by the Kubernetes API server.
//!
//! Reads go straight to the API server rather than a reflector cache so a
//! pass always acts on the latest Instance list.

use super::{ObjectStore, StoreError};
use crds::{Instance, POOL_NAME_LABEL, Pool};
use k8s_openapi::api::core::v1::Node;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Object store using cluster-scoped `Api` handles
#[derive(Clone)]
pub struct KubeStore {
    pools: Api<Pool>,
    instances: Api<Instance>,
    nodes: Api<Node>,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            pools: Api::all(client.clone()),
            instances: Api::all(client.clone()),
            nodes: Api::all(client),
        }
    }
}

/// Maps 404 and 409 responses onto the store's own error variants
fn map_error(kind: &'static str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind,
            name: name.to_string(),
        },
        e => StoreError::Kube(e),
    }
}

fn object_name(name: Option<&String>) -> &str {
    name.map_or("<unnamed>", String::as_str)
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, StoreError> {
        self.pools
            .get_opt(name)
            .await
            .map_err(|e| map_error("Pool", name, e))
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, StoreError> {
        let name = object_name(pool.metadata.name.as_ref());
        self.pools
            .replace(name, &PostParams::default(), pool)
            .await
            .map_err(|e| map_error("Pool", name, e))
    }

    async fn list_instances(&self, pool: &str) -> Result<Vec<Instance>, StoreError> {
        let params = ListParams::default().labels(&format!("{POOL_NAME_LABEL}={pool}"));
        let list = self
            .instances
            .list(&params)
            .await
            .map_err(|e| map_error("Instance", pool, e))?;
        debug!("Listed {} instance(s) for pool {}", list.items.len(), pool);
        Ok(list.items)
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, StoreError> {
        self.instances
            .get_opt(name)
            .await
            .map_err(|e| map_error("Instance", name, e))
    }

    async fn create_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let name = instance
            .metadata
            .name
            .as_deref()
            .or(instance.metadata.generate_name.as_deref())
            .unwrap_or("<unnamed>");
        self.instances
            .create(&PostParams::default(), instance)
            .await
            .map_err(|e| map_error("Instance", name, e))
    }

    async fn update_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let name = object_name(instance.metadata.name.as_ref());
        self.instances
            .replace(name, &PostParams::default(), instance)
            .await
            .map_err(|e| map_error("Instance", name, e))
    }

    async fn delete_instance(&self, name: &str) -> Result<(), StoreError> {
        match self.instances.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!("Instance {} already deleted", name);
                Ok(())
            }
            Err(e) => Err(map_error("Instance", name, e)),
        }
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        self.nodes
            .get_opt(name)
            .await
            .map_err(|e| map_error("Node", name, e))
    }

    async fn delete_node(&self, name: &str) -> Result<(), StoreError> {
        match self.nodes.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!("Node {} already deleted", name);
                Ok(())
            }
            Err(e) => Err(map_error("Node", name, e)),
        }
    }
}
