//! Spotcluster Controller
//!
//! Keeps a set of DigitalOcean droplets joined to a k3s cluster as worker
//! nodes.
//!
//! The Pool controller scales the `Instance` records of each `Pool` to its
//! replica count. The Instance controller provisions a droplet for each
//! Instance, installs the k3s agent over SSH, tracks node readiness and
//! tears everything down when the Instance is deleted.

mod backoff;
mod config;
mod controller;
mod credentials;
mod error;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::{ControllerConfig, ReloadMode};
use crate::error::ControllerError;
use controller::Controller;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting spotcluster controller");

    let config = ControllerConfig::from_env()?;
    config.log_summary();
    let reload_mode = config.credential_reload;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let controller = Controller::new(config).await?;

    tokio::spawn(shutdown_on(tokio::signal::ctrl_c(), Arc::clone(&shutdown_tx)));

    tokio::spawn({
        let shutdown_tx = Arc::clone(&shutdown_tx);
        let mut reloads = controller.reload_signal().subscribe();
        async move {
            while reloads.changed().await.is_ok() {
                let generation = *reloads.borrow_and_update();
                match reload_mode {
                    ReloadMode::Restart => {
                        info!("Credential file replaced (generation {}), restarting", generation);
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    ReloadMode::Log => {
                        info!("Credential file replaced (generation {})", generation);
                    }
                }
            }
        }
    });

    controller.run(shutdown_rx).await?;

    info!("Spotcluster controller shutdown complete");
    Ok(())
}

/// Flags shutdown once `signal` fires
///
/// A listener that fails to install leaves the controllers running.
async fn shutdown_on<F>(signal: F, shutdown_tx: Arc<watch::Sender<bool>>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_requests_shutdown() {
        let (tx, rx) = watch::channel(false);
        shutdown_on(async { Ok(()) }, Arc::new(tx)).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_failed_signal_listener_keeps_running() {
        let (tx, rx) = watch::channel(false);
        let failing = async { Err(std::io::Error::other("no signal handler")) };
        shutdown_on(failing, Arc::new(tx)).await;
        assert!(!*rx.borrow());
    }
}
