//! Compute provider resolution.
//!
//! Pools may carry their own API token; clients are built lazily per token
//! and reused across passes.

use digitalocean_client::{ComputeProvider, DigitalOceanClient, ProviderError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Hands out a provider client for an API token
pub trait ProviderFactory: Send + Sync {
    /// Client for `token`, or for the controller-wide token when `None`
    fn provider_for(&self, token: Option<&str>) -> Result<Arc<dyn ComputeProvider>, ProviderError>;
}

/// DigitalOcean clients cached by token
#[derive(Debug)]
pub struct DigitalOceanFactory {
    base_url: String,
    default_token: Option<String>,
    clients: Mutex<HashMap<String, Arc<DigitalOceanClient>>>,
}

impl DigitalOceanFactory {
    pub fn new(base_url: String, default_token: Option<String>) -> Self {
        Self {
            base_url,
            default_token,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl ProviderFactory for DigitalOceanFactory {
    fn provider_for(&self, token: Option<&str>) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
        let token = token
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref())
            .ok_or_else(|| {
                ProviderError::Authentication(
                    "no API token on the pool and DIGITALOCEAN_TOKEN is not set".to_string(),
                )
            })?;

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(token) {
            return Ok(Arc::clone(client) as Arc<dyn ComputeProvider>);
        }

        debug!("Creating DigitalOcean client for {}", self.base_url);
        let client = Arc::new(DigitalOceanClient::new(self.base_url.clone(), token.to_string())?);
        clients.insert(token.to_string(), Arc::clone(&client));
        Ok(client)
    }
}
