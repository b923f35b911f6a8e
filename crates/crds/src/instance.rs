//! Instance CRD
//!
//! Records one provisioned compute unit and its progress towards becoming
//! a ready cluster node. The four readiness flags are the persisted form of
//! the instance state machine.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels::POOL_NAME_LABEL;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "spotcluster.io",
    version = "v1alpha1",
    kind = "Instance",
    shortname = "inst",
    printcolumn = r#"{"name":"Pool","type":"string","jsonPath":".metadata.labels.pool\\.spotcluster\\.io/name"}"#,
    printcolumn = r#"{"name":"External-IP","type":"string","jsonPath":".spec.externalIP"}"#,
    printcolumn = r#"{"name":"Instance-Ready","type":"boolean","jsonPath":".spec.instanceReady"}"#,
    printcolumn = r#"{"name":"Node-Ready","type":"boolean","jsonPath":".spec.nodeReady"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// SSH endpoint of the droplet ("host:port")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_address: String,

    /// Private network address
    #[serde(default, rename = "internalIP", skip_serializing_if = "String::is_empty")]
    pub internal_ip: String,

    /// Public network address
    #[serde(default, rename = "externalIP", skip_serializing_if = "String::is_empty")]
    pub external_ip: String,

    /// Name of the cluster node this instance registered as
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,

    /// Node password generated by the agent during cluster join
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_password: String,

    /// Provider-side name of the droplet
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_name: String,

    /// A droplet exists for this instance
    #[serde(default)]
    pub instance_available: bool,

    /// The droplet is reported running
    #[serde(default)]
    pub instance_ready: bool,

    /// The cluster-join bootstrap completed
    #[serde(default)]
    pub node_available: bool,

    /// The cluster node is schedulable
    #[serde(default)]
    pub node_ready: bool,
}

impl InstanceSpec {
    /// Clears every readiness flag and cached address so the droplet is
    /// provisioned again from scratch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Instance {
    /// True once the store has recorded a deletion request for this Instance
    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Name of the owning Pool, taken from the pool label
    pub fn pool_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(POOL_NAME_LABEL))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Unique provider tag identifying the droplet backing this Instance
    pub fn provider_tag(&self) -> Option<&str> {
        self.metadata.uid.as_deref().filter(|uid| !uid.is_empty())
    }

    /// Whether the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}
