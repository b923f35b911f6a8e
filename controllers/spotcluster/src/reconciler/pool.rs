//! Pool reconciliation: scale the Instance set and guard Pool deletion.

use super::Reconciler;
use crate::credentials::SyncOutcome;
use crate::error::ControllerError;
use kube_runtime::controller::Action;
use crds::{INSTANCE_FINALIZER, Instance, InstanceSpec, POOL_FINALIZER, POOL_NAME_LABEL, POOL_UID_LABEL, Pool};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

/// Password of every Instance that has completed the cluster join
fn live_passwords(instances: &[Instance]) -> HashMap<String, String> {
    instances
        .iter()
        .filter(|i| !i.spec.node_password.is_empty())
        .filter_map(|i| {
            i.metadata
                .name
                .clone()
                .map(|name| (name, i.spec.node_password.clone()))
        })
        .collect()
}

/// Fresh Instance record owned by `pool`, all flags false
fn instance_template(pool: &Pool) -> Instance {
    let pool_name = pool.metadata.name.clone().unwrap_or_default();
    let mut labels = BTreeMap::from([(POOL_NAME_LABEL.to_string(), pool_name.clone())]);
    if let Some(uid) = &pool.metadata.uid {
        labels.insert(POOL_UID_LABEL.to_string(), uid.clone());
    }

    Instance {
        metadata: ObjectMeta {
            generate_name: Some(format!("{pool_name}-")),
            labels: Some(labels),
            finalizers: Some(vec![INSTANCE_FINALIZER.to_string()]),
            ..Default::default()
        },
        spec: InstanceSpec::default(),
    }
}

impl Reconciler {
    /// One pass over the Pool called `name`
    pub async fn reconcile_pool(&self, name: &str) -> Result<Action, ControllerError> {
        let Some(pool) = self.store.get_pool(name).await? else {
            debug!("Pool {} not found, already deleted", name);
            return Ok(Action::await_change());
        };

        let instances = self.store.list_instances(name).await?;
        let current = instances.len();
        let desired = pool.spec.replicas as usize;

        self.sync_credentials(&instances).await;

        if pool.deletion_requested() {
            return self.finish_pool_deletion(pool, current).await;
        }

        let pool = self.ensure_pool_finalizer(pool).await?;

        if desired > current {
            self.scale_up(&pool, desired - current).await?;
        } else if desired < current {
            self.scale_down(name, &instances, current - desired).await?;
        } else {
            debug!("Pool {} has {} instance(s) as desired", name, current);
        }
        Ok(Action::await_change())
    }

    async fn sync_credentials(&self, instances: &[Instance]) {
        match self.credentials.sync(&live_passwords(instances)).await {
            Ok(SyncOutcome::Replaced { removed }) => {
                self.reload.notify();
                info!(
                    "Credential file {} replaced, {} record(s) removed (reload {})",
                    self.credentials.path().display(),
                    removed,
                    self.reload.generation()
                );
            }
            Ok(SyncOutcome::Unchanged) => {}
            Err(e) => {
                warn!(
                    "Failed to sync credential file {}: {}",
                    self.credentials.path().display(),
                    e
                );
            }
        }
    }

    async fn finish_pool_deletion(&self, pool: Pool, current: usize) -> Result<Action, ControllerError> {
        let name = pool.metadata.name.clone().unwrap_or_default();
        if current > 0 {
            info!("Pool {} is being deleted, waiting for {} instance(s)", name, current);
            return Ok(Action::await_change());
        }
        if !pool.has_finalizer(POOL_FINALIZER) {
            return Ok(Action::await_change());
        }

        let mut updated = pool;
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != POOL_FINALIZER);
        }
        self.store.update_pool(&updated).await?;
        info!("Removed finalizer from Pool {}", name);
        Ok(Action::await_change())
    }

    async fn ensure_pool_finalizer(&self, pool: Pool) -> Result<Pool, ControllerError> {
        if pool.has_finalizer(POOL_FINALIZER) {
            return Ok(pool);
        }
        let mut updated = pool;
        updated
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(POOL_FINALIZER.to_string());
        let stored = self.store.update_pool(&updated).await?;
        debug!(
            "Added finalizer to Pool {}",
            stored.metadata.name.as_deref().unwrap_or_default()
        );
        Ok(stored)
    }

    /// Creates `count` Instances; every creation is attempted even if one fails
    async fn scale_up(&self, pool: &Pool, count: usize) -> Result<(), ControllerError> {
        let pool_name = pool.metadata.name.as_deref().unwrap_or_default();
        info!("Scaling Pool {} up by {}", pool_name, count);

        let template = instance_template(pool);
        let mut failed = 0;
        for _ in 0..count {
            match self.store.create_instance(&template).await {
                Ok(created) => {
                    info!(
                        "Created Instance {} for Pool {}",
                        created.metadata.name.as_deref().unwrap_or_default(),
                        pool_name
                    );
                }
                Err(e) => {
                    error!("Failed to create Instance for Pool {}: {}", pool_name, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(ControllerError::Reconciliation(format!(
                "{failed} of {count} Instance creation(s) failed for Pool {pool_name}"
            )));
        }
        Ok(())
    }

    /// Requests deletion of the `excess` last-listed Instances
    ///
    /// Instances already being deleted count towards the excess.
    async fn scale_down(
        &self,
        pool_name: &str,
        instances: &[Instance],
        excess: usize,
    ) -> Result<(), ControllerError> {
        let deleting = instances.iter().filter(|i| i.deletion_requested()).count();
        let to_delete = excess.saturating_sub(deleting);
        if to_delete == 0 {
            debug!(
                "Pool {} already has {} instance(s) being deleted",
                pool_name, deleting
            );
            return Ok(());
        }

        let candidates: Vec<&Instance> = instances.iter().filter(|i| !i.deletion_requested()).collect();
        let victims = &candidates[candidates.len().saturating_sub(to_delete)..];
        info!("Scaling Pool {} down by {}", pool_name, victims.len());

        let mut failed = 0;
        for instance in victims {
            let name = instance.metadata.name.as_deref().unwrap_or_default();
            match self.store.delete_instance(name).await {
                Ok(()) => info!("Requested deletion of Instance {}", name),
                Err(e) => {
                    error!("Failed to delete Instance {}: {}", name, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(ControllerError::Reconciliation(format!(
                "{failed} Instance deletion(s) failed for Pool {pool_name}"
            )));
        }
        Ok(())
    }
}
