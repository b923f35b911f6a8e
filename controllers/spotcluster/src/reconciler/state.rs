//! Instance provisioning state machine.
//!
//! The four readiness flags on an Instance are the persisted form of its
//! state. [`InstanceState::of`] reads the state back from them and
//! [`validate_transition`] rejects writes that would jump between states
//! without a matching edge.

use crate::error::ControllerError;
use crds::{Instance, InstanceSpec};
use std::fmt;
use std::time::Duration;

/// Requeue interval while waiting for a droplet to start
pub const INSTANCE_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Requeue interval while a joined node is not ready
pub const NODE_CONVERGING_INTERVAL: Duration = Duration::from_secs(30);

/// Resync interval for a healthy node
pub const NODE_READY_RESYNC: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// No running droplet is known yet
    AwaitingInstance,
    /// The droplet runs; the cluster agent is not installed
    AwaitingWorkerJoin,
    /// The agent is installed; the node is not (or no longer) ready
    NodeConverging,
    /// The node is schedulable
    NodeReady,
    /// Deletion was requested; teardown pending
    AwaitingDeletion,
}

impl InstanceState {
    /// Infers the state from the deletion marker and the flags
    pub fn infer(deletion_requested: bool, spec: &InstanceSpec) -> Self {
        if deletion_requested {
            InstanceState::AwaitingDeletion
        } else if spec.node_available && spec.node_ready {
            InstanceState::NodeReady
        } else if spec.node_available {
            InstanceState::NodeConverging
        } else if !spec.instance_available || !spec.instance_ready {
            InstanceState::AwaitingInstance
        } else {
            InstanceState::AwaitingWorkerJoin
        }
    }

    pub fn of(instance: &Instance) -> Self {
        Self::infer(instance.deletion_requested(), &instance.spec)
    }

    /// Whether a single pass may move an Instance from `self` to `next`
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (self, next) {
            (_, AwaitingDeletion) => true,
            (AwaitingDeletion, _) => false,
            (AwaitingInstance, AwaitingInstance | AwaitingWorkerJoin) => true,
            (AwaitingInstance, _) => false,
            (AwaitingWorkerJoin, _) => true,
            (NodeConverging | NodeReady, AwaitingWorkerJoin) => false,
            (NodeConverging | NodeReady, _) => true,
        }
    }

    /// Periodic resync for states that are polled rather than event driven
    pub fn resync_interval(self) -> Option<Duration> {
        match self {
            InstanceState::NodeConverging => Some(NODE_CONVERGING_INTERVAL),
            InstanceState::NodeReady => Some(NODE_READY_RESYNC),
            _ => None,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::AwaitingInstance => "AwaitingInstance",
            InstanceState::AwaitingWorkerJoin => "AwaitingWorkerJoin",
            InstanceState::NodeConverging => "NodeConverging",
            InstanceState::NodeReady => "NodeReady",
            InstanceState::AwaitingDeletion => "AwaitingDeletion",
        };
        f.write_str(name)
    }
}

/// Rejects a write moving `name` along an edge the state machine lacks
pub fn validate_transition(
    name: &str,
    from: InstanceState,
    to: InstanceState,
) -> Result<(), ControllerError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ControllerError::InvalidTransition {
            name: name.to_string(),
            from,
            to,
        })
    }
}
