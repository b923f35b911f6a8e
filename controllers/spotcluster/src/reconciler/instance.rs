//! Instance reconciliation.
//!
//! Each pass infers the [`InstanceState`] from the persisted flags and runs
//! the handler for that state. Handlers build the desired Instance from the
//! fetched one and hand both to [`Reconciler::write_instance`], which
//! validates the transition and skips writes that change nothing.

use super::Reconciler;
use super::state::{INSTANCE_POLL_INTERVAL, InstanceState, validate_transition};
use crate::error::ControllerError;
use kube_runtime::controller::Action;
use crds::{INSTANCE_FINALIZER, INSTANCE_ID_LABEL, Instance, Pool};
use digitalocean_client::{CreateDropletRequest, DropletInfo};
use k8s_openapi::api::core::v1::Node;
use remote_bootstrap::{join_command, read_password_command};
use tracing::{debug, info, warn};

/// Port the bootstrap session connects to
const SSH_PORT: u16 = 22;

/// Taint effect marking a node that must not run workloads
const NO_EXECUTE: &str = "NoExecute";

/// A node is ready unless it carries a `NoExecute` taint
pub(crate) fn node_is_ready(node: &Node) -> bool {
    !node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .is_some_and(|taints| taints.iter().any(|t| t.effect == NO_EXECUTE))
}

/// Copy the live droplet record onto `instance`
fn apply_droplet(instance: &mut Instance, droplet: &DropletInfo) {
    let spec = &mut instance.spec;
    spec.instance_name = droplet.name.clone();
    spec.external_ip = droplet.external_ip.clone().unwrap_or_default();
    spec.internal_ip = droplet.internal_ip.clone().unwrap_or_default();
    spec.remote_address = if spec.external_ip.is_empty() {
        String::new()
    } else {
        format!("{}:{}", spec.external_ip, SSH_PORT)
    };
    spec.instance_available = true;
    spec.instance_ready = droplet.running && !spec.external_ip.is_empty();

    instance
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(INSTANCE_ID_LABEL.to_string(), droplet.id.to_string());
}

fn ensure_finalizer(instance: &mut Instance) {
    if !instance.has_finalizer(INSTANCE_FINALIZER) {
        instance
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(INSTANCE_FINALIZER.to_string());
    }
}

fn instance_name(instance: &Instance) -> &str {
    instance.metadata.name.as_deref().unwrap_or_default()
}

impl Reconciler {
    /// One pass over the Instance called `name`
    pub async fn reconcile_instance(&self, name: &str) -> Result<Action, ControllerError> {
        let Some(instance) = self.store.get_instance(name).await? else {
            debug!("Instance {} not found, already deleted", name);
            return Ok(Action::await_change());
        };

        let state = InstanceState::of(&instance);
        debug!("Reconciling Instance {} in state {}", name, state);

        match state {
            InstanceState::AwaitingDeletion => self.tear_down(instance).await,
            InstanceState::NodeConverging | InstanceState::NodeReady => {
                self.check_node(instance).await
            }
            InstanceState::AwaitingInstance => self.provision(instance).await,
            InstanceState::AwaitingWorkerJoin => self.join_worker(instance).await,
        }
    }

    /// Persist `desired` if it differs from `current`
    ///
    /// Returns the stored Instance, or `desired` when nothing was written.
    pub(crate) async fn write_instance(
        &self,
        current: &Instance,
        desired: Instance,
    ) -> Result<Instance, ControllerError> {
        let name = instance_name(current);
        let from = InstanceState::of(current);
        let to = InstanceState::of(&desired);
        validate_transition(name, from, to)?;

        if current.spec == desired.spec
            && current.metadata.labels == desired.metadata.labels
            && current.metadata.finalizers == desired.metadata.finalizers
        {
            debug!("Instance {} unchanged, skipping update", name);
            return Ok(desired);
        }

        let stored = self.store.update_instance(&desired).await?;
        if from != to {
            info!("Instance {}: {} -> {}", name, from, to);
        }
        Ok(stored)
    }

    /// The Pool owning `instance`, or `None` when it is unlabelled or gone
    async fn owning_pool(&self, instance: &Instance) -> Result<Option<Pool>, ControllerError> {
        let name = instance_name(instance);
        let Some(pool_name) = instance.pool_name() else {
            warn!("Instance {} has no owning Pool label", name);
            return Ok(None);
        };
        let pool = self.store.get_pool(pool_name).await?;
        if pool.is_none() {
            info!("Pool {} of Instance {} not found, skipping", pool_name, name);
        }
        Ok(pool)
    }

    /// API token of the owning Pool, if it still exists and sets one
    async fn pool_token(&self, instance: &Instance) -> Result<Option<String>, ControllerError> {
        let Some(pool_name) = instance.pool_name() else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_pool(pool_name)
            .await?
            .and_then(|pool| pool.digital_ocean().map(|d| d.api_key.clone()))
            .filter(|key| !key.is_empty()))
    }

    /// Delete the droplet and the node, then release the finalizer
    async fn tear_down(&self, instance: Instance) -> Result<Action, ControllerError> {
        let name = instance_name(&instance).to_string();
        if !instance.has_finalizer(INSTANCE_FINALIZER) {
            debug!("Instance {} has no finalizer, nothing to tear down", name);
            return Ok(Action::await_change());
        }

        if let Some(tag) = instance.provider_tag() {
            let token = self.pool_token(&instance).await?;
            let provider = self.providers.provider_for(token.as_deref())?;
            if provider.delete_by_tag(tag).await? {
                info!("Deleted droplet of Instance {}", name);
            } else {
                debug!("No droplet left for Instance {}", name);
            }
        }

        let node_name = if instance.spec.node_name.is_empty() {
            name.as_str()
        } else {
            instance.spec.node_name.as_str()
        };
        self.store.delete_node(node_name).await?;

        let mut released = instance.clone();
        if let Some(finalizers) = released.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != INSTANCE_FINALIZER);
        }
        self.store.update_instance(&released).await?;
        info!("Instance {} torn down", name);
        Ok(Action::await_change())
    }

    /// Re-check the cluster node of a joined Instance
    async fn check_node(&self, instance: Instance) -> Result<Action, ControllerError> {
        let name = instance_name(&instance).to_string();
        let mut desired = instance.clone();

        if !instance.spec.instance_ready {
            if let Some(tag) = instance.provider_tag() {
                let token = self.pool_token(&instance).await?;
                let provider = self.providers.provider_for(token.as_deref())?;
                if provider.find_by_tag(tag).await?.is_none() {
                    warn!("Droplet of Instance {} is gone, provisioning again", name);
                    desired.spec.reset();
                    self.write_instance(&instance, desired).await?;
                    return Ok(Action::requeue(INSTANCE_POLL_INTERVAL));
                }
            }
        }

        let node_name = if instance.spec.node_name.is_empty() {
            name.clone()
        } else {
            instance.spec.node_name.clone()
        };
        let ready = match self.store.get_node(&node_name).await? {
            Some(node) => node_is_ready(&node),
            None => {
                debug!("Node {} of Instance {} not registered", node_name, name);
                false
            }
        };

        desired.spec.node_ready = ready;
        desired.spec.instance_ready = ready;
        if ready {
            desired.spec.node_name = node_name;
        } else if instance.spec.node_ready {
            warn!("Node of Instance {} is no longer ready", name);
        }

        let stored = self.write_instance(&instance, desired).await?;
        Ok(InstanceState::of(&stored)
            .resync_interval()
            .map_or_else(Action::await_change, Action::requeue))
    }

    /// Find or create the droplet backing the Instance
    async fn provision(&self, instance: Instance) -> Result<Action, ControllerError> {
        let name = instance_name(&instance).to_string();
        let Some(pool) = self.owning_pool(&instance).await? else {
            return Ok(Action::await_change());
        };
        let pool_name = pool.metadata.name.as_deref().unwrap_or_default();
        let digital_ocean = pool.digital_ocean().ok_or_else(|| {
            ControllerError::Reconciliation(format!(
                "Pool {pool_name} has no digitalOcean provider settings"
            ))
        })?;
        let tag = instance.provider_tag().ok_or_else(|| {
            ControllerError::Reconciliation(format!("Instance {name} has no uid yet"))
        })?;
        let provider = self.providers.provider_for(Some(digital_ocean.api_key.as_str()))?;

        let mut desired = instance.clone();
        match provider.find_by_tag(tag).await? {
            Some(droplet) => {
                debug!("Found droplet {} for Instance {}", droplet.id, name);
                apply_droplet(&mut desired, &droplet);
            }
            None if instance.spec.instance_available => {
                warn!("Droplet of Instance {} disappeared, resetting", name);
                desired.spec.reset();
            }
            None => {
                let request = CreateDropletRequest {
                    name: name.clone(),
                    region: digital_ocean.region.clone(),
                    size: digital_ocean.instance_size.clone(),
                    image: digital_ocean.image.clone(),
                    tag: tag.to_string(),
                    ssh_fingerprint: pool.spec.ssh_fingerprint.clone(),
                };
                let droplet = provider.create(&request).await?;
                info!("Created droplet {} for Instance {}", droplet.id, name);
                apply_droplet(&mut desired, &droplet);
            }
        }
        ensure_finalizer(&mut desired);

        let stored = self.write_instance(&instance, desired).await?;
        if stored.spec.instance_ready {
            Ok(Action::await_change())
        } else {
            Ok(Action::requeue(INSTANCE_POLL_INTERVAL))
        }
    }

    /// Install the cluster agent and read back the node password
    async fn join_worker(&self, instance: Instance) -> Result<Action, ControllerError> {
        let name = instance_name(&instance).to_string();
        let Some(pool) = self.owning_pool(&instance).await? else {
            return Ok(Action::await_change());
        };
        let address = instance.spec.remote_address.as_str();
        if address.is_empty() {
            return Err(ControllerError::Reconciliation(format!(
                "Instance {name} has no remote address"
            )));
        }
        let user = self.settings.ssh_user.as_str();

        let join = join_command(
            &self.settings.install_url,
            &pool.spec.cluster_join_url,
            &pool.spec.cluster_join_token,
        );
        self.bootstrap.run_command(user, address, &join).await?;
        info!("Cluster agent installed on Instance {}", name);

        let output = self
            .bootstrap
            .run_command(user, address, &read_password_command(&self.settings.node_password_path))
            .await?;
        let password = output.stdout.trim();
        if password.is_empty() {
            return Err(ControllerError::Reconciliation(format!(
                "Instance {name} returned an empty node password"
            )));
        }

        let mut desired = instance.clone();
        desired.spec.node_password = password.to_string();
        desired.spec.node_available = true;
        desired.spec.node_name = name;
        let stored = self.write_instance(&instance, desired).await?;
        Ok(InstanceState::of(&stored)
            .resync_interval()
            .map_or_else(Action::await_change, Action::requeue))
    }
}
