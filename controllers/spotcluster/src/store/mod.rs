//! Object store access.
//!
//! The reconcilers read and write Pools, Instances and Nodes through
//! [`ObjectStore`] so they can run against the cluster API or an in-memory
//! store in tests.

pub mod api;
#[cfg(test)]
pub mod mock;

use crds::{Instance, Pool};
use k8s_openapi::api::core::v1::Node;
use thiserror::Error;

pub use api::KubeStore;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist (or no longer exists)
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// A write lost an optimistic concurrency race
    #[error("Conflicting write to {kind} {name}")]
    Conflict { kind: &'static str, name: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other backend failure
    #[error("Object store backend error: {0}")]
    Backend(String),
}

/// Reads and writes the objects the controllers reconcile
///
/// Getters return `Ok(None)` for missing objects; deletes of missing
/// objects succeed.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, StoreError>;
    async fn update_pool(&self, pool: &Pool) -> Result<Pool, StoreError>;

    /// Instances carrying the owning-pool label for `pool`, in store order
    async fn list_instances(&self, pool: &str) -> Result<Vec<Instance>, StoreError>;
    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, StoreError>;
    async fn create_instance(&self, instance: &Instance) -> Result<Instance, StoreError>;
    async fn update_instance(&self, instance: &Instance) -> Result<Instance, StoreError>;
    /// Requests deletion; the store finishes it once no finalizers remain
    async fn delete_instance(&self, name: &str) -> Result<(), StoreError>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError>;
    async fn delete_node(&self, name: &str) -> Result<(), StoreError>;
}
