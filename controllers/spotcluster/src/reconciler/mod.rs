//! Reconciliation logic for Pool and Instance resources.
//!
//! - `pool`: scales the Instance set of a Pool and keeps the credential file in sync
//! - `instance`: drives one Instance through provisioning, cluster join and teardown
//! - `state`: the Instance state machine
//! - `provider`: per-token compute provider clients

pub mod instance;
pub mod pool;
pub mod provider;
pub mod state;


use crate::backoff::ItemBackoff;
use crate::credentials::{CredentialSync, ReloadSignal};
use crate::store::ObjectStore;
use provider::ProviderFactory;
use remote_bootstrap::RemoteBootstrap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Settings used while bootstrapping workers
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub ssh_user: String,
    pub install_url: String,
    pub node_password_path: String,
}

/// Reconciles Pools and Instances against the store and the provider
pub struct Reconciler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) providers: Arc<dyn ProviderFactory>,
    pub(crate) bootstrap: Arc<dyn RemoteBootstrap>,
    pub(crate) credentials: Arc<CredentialSync>,
    pub(crate) reload: ReloadSignal,
    pub(crate) settings: BootstrapSettings,
    retries: Mutex<ItemBackoff>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        providers: Arc<dyn ProviderFactory>,
        bootstrap: Arc<dyn RemoteBootstrap>,
        credentials: Arc<CredentialSync>,
        reload: ReloadSignal,
        settings: BootstrapSettings,
    ) -> Self {
        Self {
            store,
            providers,
            bootstrap,
            credentials,
            reload,
            settings,
            retries: Mutex::new(ItemBackoff::default()),
        }
    }

    fn retries(&self) -> MutexGuard<'_, ItemBackoff> {
        self.retries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failed pass for `key`; returns the retry delay and attempt number
    pub fn record_failure(&self, key: &str) -> (Duration, u32) {
        let mut retries = self.retries();
        let delay = retries.next_delay(key);
        (delay, retries.num_requeues(key))
    }

    /// Reset the failure count of `key` after a clean pass
    pub fn reset_failures(&self, key: &str) {
        self.retries().forget(key);
    }
}
