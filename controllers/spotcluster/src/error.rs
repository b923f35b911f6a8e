//! Controller-specific error types.
//!
//! Every error a reconciliation pass can return, plus the classification
//! the error policy uses to decide between retrying and waiting for a change.

use crate::reconciler::state::InstanceState;
use crate::store::StoreError;
use digitalocean_client::ProviderError;
use kube::Error as KubeError;
use remote_bootstrap::BootstrapError;
use thiserror::Error;

/// Errors that can occur in the spotcluster controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error outside the object store adapter
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store read or write failed
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Compute provider call failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Remote bootstrap failed
    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pass tried to move an Instance along an edge the state machine does not have
    #[error("Invalid state transition for Instance {name}: {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: InstanceState,
        to: InstanceState,
    },

    /// Initial cache synchronization did not complete
    #[error("Cache sync failed: {0}")]
    CacheSync(String),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),
}

/// How a failure is treated by the error policy and at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object vanished; the pass is finished
    NotFound,
    /// External I/O failed; retried with backoff
    TransientExternal,
    /// The input can never be processed; dropped without retry
    Malformed,
    /// The controller cannot start
    StartupFatal,
    /// More than one provider resource carries a unique tag; retried
    AmbiguousProvider,
}

impl ControllerError {
    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            ControllerError::Provider(e) if e.is_ambiguous() => ErrorKind::AmbiguousProvider,
            ControllerError::InvalidTransition { .. } => ErrorKind::Malformed,
            ControllerError::InvalidConfig(_) | ControllerError::CacheSync(_) => {
                ErrorKind::StartupFatal
            }
            ControllerError::Kube(_)
            | ControllerError::Store(_)
            | ControllerError::Provider(_)
            | ControllerError::Bootstrap(_)
            | ControllerError::Reconciliation(_) => ErrorKind::TransientExternal,
        }
    }
}
