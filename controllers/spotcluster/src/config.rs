//! Controller configuration.
//!
//! Read once from environment variables at startup.

use crate::error::ControllerError;
use digitalocean_client::client::DEFAULT_API_URL;
use remote_bootstrap::{DEFAULT_INSTALL_URL, DEFAULT_NODE_PASSWORD_PATH};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// What to do after the credential file has been rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMode {
    /// Shut down gracefully so the supervisor restarts the process
    Restart,
    /// Only log the replacement
    Log,
}

impl FromStr for ReloadMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restart" => Ok(ReloadMode::Restart),
            "log" => Ok(ReloadMode::Log),
            other => Err(ControllerError::InvalidConfig(format!(
                "CREDENTIAL_RELOAD must be 'restart' or 'log', got '{other}'"
            ))),
        }
    }
}

/// Settings for both controllers
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub node_password_file: PathBuf,
    pub ssh_private_key: PathBuf,
    pub ssh_user: String,
    pub ssh_connect_timeout: Duration,
    pub pool_workers: u16,
    pub instance_workers: u16,
    pub cache_sync_timeout: Duration,
    pub credential_reload: ReloadMode,
    pub digitalocean_api_url: String,
    pub digitalocean_token: Option<String>,
    pub k3s_install_url: String,
    pub node_password_path: String,
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let pool_workers = parse_number(&get, "POOL_WORKERS", 1)?;
        let instance_workers = parse_number(&get, "INSTANCE_WORKERS", 1)?;
        if pool_workers == 0 || instance_workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "POOL_WORKERS and INSTANCE_WORKERS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            node_password_file: PathBuf::from(or("NODE_PASSWORD_FILE", "/etc/node-pwd/node-passwd")),
            ssh_private_key: PathBuf::from(or("SSH_PRIVATE_KEY", "/etc/spotcluster/id_rsa")),
            ssh_user: or("SSH_USER", "root"),
            ssh_connect_timeout: Duration::from_secs(parse_number(&get, "SSH_CONNECT_TIMEOUT_SECS", 600)?),
            pool_workers,
            instance_workers,
            cache_sync_timeout: Duration::from_secs(parse_number(&get, "CACHE_SYNC_TIMEOUT_SECS", 120)?),
            credential_reload: or("CREDENTIAL_RELOAD", "restart").parse()?,
            digitalocean_api_url: or("DIGITALOCEAN_API_URL", DEFAULT_API_URL),
            digitalocean_token: get("DIGITALOCEAN_TOKEN"),
            k3s_install_url: or("K3S_INSTALL_URL", DEFAULT_INSTALL_URL),
            node_password_path: or("NODE_PASSWORD_PATH", DEFAULT_NODE_PASSWORD_PATH),
        })
    }

    /// Log the effective configuration, secrets excluded
    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Credential file: {}", self.node_password_file.display());
        info!("  SSH: {} with key {}", self.ssh_user, self.ssh_private_key.display());
        info!("  Workers: {} pool, {} instance", self.pool_workers, self.instance_workers);
        info!("  DigitalOcean API: {}", self.digitalocean_api_url);
        info!(
            "  Fallback token: {}",
            if self.digitalocean_token.is_some() { "set" } else { "not set" }
        );
        info!("  Credential reload: {:?}", self.credential_reload);
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}
