//! Mock ComputeProvider for unit testing
//!
//! Keeps droplets in memory keyed by id so controllers can be tested
//! without a DigitalOcean account.

use crate::error::ProviderError;
use crate::models::*;
use crate::provider_trait::ComputeProvider;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    droplets: BTreeMap<u64, (String, DropletInfo)>,
    next_id: u64,
}

/// Mock droplet provider
///
/// New droplets start out not running and without addresses; tests flip
/// them with [`MockDropletClient::set_running`].
#[derive(Debug, Clone, Default)]
pub struct MockDropletClient {
    state: Arc<Mutex<MockState>>,
    fail_create: Arc<AtomicBool>,
    fail_find: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    create_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl MockDropletClient {
    /// Create an empty mock provider
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a droplet carrying `tag` (for test setup); returns its id
    pub fn add_droplet(&self, tag: &str, running: bool, external_ip: Option<&str>) -> u64 {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        let info = DropletInfo {
            id,
            name: format!("droplet-{id}"),
            external_ip: external_ip.map(str::to_string),
            internal_ip: external_ip.map(|_| format!("10.110.0.{id}")),
            running,
        };
        state.droplets.insert(id, (tag.to_string(), info));
        id
    }

    /// Mark every droplet carrying `tag` running with the given public address
    pub fn set_running(&self, tag: &str, external_ip: &str) {
        for (droplet_tag, info) in self.state().droplets.values_mut() {
            if droplet_tag == tag {
                info.running = true;
                info.external_ip = Some(external_ip.to_string());
                info.internal_ip = Some(format!("10.110.0.{}", info.id));
            }
        }
    }

    /// Remove droplets carrying `tag` behind the controller's back
    pub fn remove_by_tag(&self, tag: &str) {
        self.state().droplets.retain(|_, (t, _)| t != tag);
    }

    /// Number of droplets carrying `tag`
    pub fn count_tagged(&self, tag: &str) -> usize {
        self.state().droplets.values().filter(|(t, _)| t == tag).count()
    }

    /// Total number of droplets
    pub fn droplet_count(&self) -> usize {
        self.state().droplets.len()
    }

    /// Number of `create` calls so far
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_by_tag` calls so far
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Make `create` fail with an API error
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `find_by_tag` fail with an API error
    pub fn fail_find(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_by_tag` fail with an API error
    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), ProviderError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: format!("injected {operation} failure"),
            });
        }
        Ok(())
    }

    fn unique(state: &MockState, tag: &str) -> Result<Option<DropletInfo>, ProviderError> {
        let matches: Vec<&DropletInfo> = state
            .droplets
            .values()
            .filter(|(t, _)| t == tag)
            .map(|(_, info)| info)
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some((*only).clone())),
            many => Err(ProviderError::AmbiguousTag {
                tag: tag.to_string(),
                count: many.len(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ComputeProvider for MockDropletClient {
    async fn create(&self, request: &CreateDropletRequest) -> Result<DropletInfo, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_create, "create")?;

        let mut state = self.state();
        state.next_id += 1;
        let info = DropletInfo {
            id: state.next_id,
            name: request.name.clone(),
            external_ip: None,
            internal_ip: None,
            running: false,
        };
        state
            .droplets
            .insert(info.id, (request.tag.clone(), info.clone()));
        Ok(info)
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Option<DropletInfo>, ProviderError> {
        Self::injected(&self.fail_find, "find")?;
        Self::unique(&self.state(), tag)
    }

    async fn delete_by_tag(&self, tag: &str) -> Result<bool, ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_delete, "delete")?;

        let mut state = self.state();
        match Self::unique(&state, tag)? {
            Some(info) => {
                state.droplets.remove(&info.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
