//! Main controller implementation.
//!
//! Wires the reconciler to its collaborators and runs the Pool and Instance
//! controllers side by side on `kube_runtime::Controller`.

use crate::config::ControllerConfig;
use crate::credentials::{CredentialSync, ReloadSignal};
use crate::error::ControllerError;
use crate::reconciler::provider::DigitalOceanFactory;
use crate::reconciler::{BootstrapSettings, Reconciler};
use crate::store::KubeStore;
use crate::watcher::{error_policy, owning_pool_ref, reconcile_instance, reconcile_pool, stop_requested};
use crds::{Instance, Pool};
use futures::StreamExt;
use kube::{Api, Client, Resource};
use kube_runtime::controller::Config as RunnerConfig;
use kube_runtime::reflector::Store;
use kube_runtime::{Controller as Runner, watcher};
use remote_bootstrap::SshBootstrapClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Pool and Instance controllers sharing one reconciler
pub struct Controller {
    config: ControllerConfig,
    client: Client,
    reload: ReloadSignal,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Connects to the cluster with the ambient kubeconfig
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing spotcluster controller");
        let client = Client::try_default().await?;
        Ok(Self {
            config,
            client,
            reload: ReloadSignal::new(),
        })
    }

    /// Fires whenever the credential file is replaced
    pub fn reload_signal(&self) -> ReloadSignal {
        self.reload.clone()
    }

    /// Runs both controllers until `shutdown` turns true
    ///
    /// In-flight passes finish before this returns. Fails if either cache
    /// does not sync within the configured timeout.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
        let config = &self.config;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::new(self.client.clone())),
            Arc::new(DigitalOceanFactory::new(
                config.digitalocean_api_url.clone(),
                config.digitalocean_token.clone(),
            )),
            Arc::new(
                SshBootstrapClient::new(&config.ssh_private_key)
                    .with_connect_timeout(config.ssh_connect_timeout),
            ),
            Arc::new(CredentialSync::new(&config.node_password_file)),
            self.reload.clone(),
            BootstrapSettings {
                ssh_user: config.ssh_user.clone(),
                install_url: config.k3s_install_url.clone(),
                node_password_path: config.node_password_path.clone(),
            },
        ));

        let pools: Api<Pool> = Api::all(self.client.clone());
        let instances: Api<Instance> = Api::all(self.client.clone());

        // Pools are triggered by their own events and by those of their Instances
        let pool_runner = Runner::new(pools, watcher::Config::default())
            .watches(instances.clone(), watcher::Config::default(), owning_pool_ref)
            .with_config(RunnerConfig::default().concurrency(config.pool_workers))
            .graceful_shutdown_on(stop_requested(shutdown.clone()));
        let pool_store = pool_runner.store();
        let pool_run = pool_runner
            .run(reconcile_pool, error_policy::<Pool>, Arc::clone(&reconciler))
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled Pool {}: {:?}", obj.name, action),
                    Err(e) => error!("Pool controller error: {}", e),
                }
            });

        let instance_runner = Runner::new(instances, watcher::Config::default())
            .with_config(RunnerConfig::default().concurrency(config.instance_workers))
            .graceful_shutdown_on(stop_requested(shutdown.clone()));
        let instance_store = instance_runner.store();
        let instance_run = instance_runner
            .run(reconcile_instance, error_policy::<Instance>, reconciler)
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled Instance {}: {:?}", obj.name, action),
                    Err(e) => error!("Instance controller error: {}", e),
                }
            });

        info!(
            "Starting controllers: {} pool worker(s), {} instance worker(s)",
            config.pool_workers, config.instance_workers
        );
        tokio::try_join!(
            supervise("pool", pool_store, pool_run, config.cache_sync_timeout, shutdown.clone()),
            supervise(
                "instance",
                instance_store,
                instance_run,
                config.cache_sync_timeout,
                shutdown,
            ),
        )?;
        info!("Controllers stopped");
        Ok(())
    }
}

/// Drives one controller to completion
///
/// Gives up when the controller's cache has not synced within `sync_timeout`.
async fn supervise<K>(
    name: &'static str,
    store: Store<K>,
    run: impl Future<Output = ()>,
    sync_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    info!("Starting {} controller", name);
    tokio::pin!(run);

    let synced = tokio::time::timeout(sync_timeout, store.wait_until_ready());
    tokio::select! {
        () = &mut run => {
            info!("{} controller stopped before caches synced", name);
            return Ok(());
        }
        () = stop_requested(shutdown) => {
            info!("{} controller stopping before caches synced", name);
            return Ok(());
        }
        result = synced => match result {
            Ok(Ok(())) => info!("{} controller caches synced", name),
            Ok(Err(_)) => {
                let e = ControllerError::CacheSync(format!("{name} cache dropped before syncing"));
                error!("{}", e);
                return Err(e);
            }
            Err(_) => {
                let e = ControllerError::CacheSync(format!(
                    "{name} caches not synced within {sync_timeout:?}"
                ));
                error!("{}", e);
                return Err(e);
            }
        },
    }

    run.await;
    info!("{} controller stopped", name);
    Ok(())
}
