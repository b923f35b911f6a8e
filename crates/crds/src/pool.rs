//! Pool CRD
//!
//! Declares the desired number of worker instances and the provider
//! parameters used to create them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "spotcluster.io",
    version = "v1alpha1",
    kind = "Pool",
    shortname = "pl",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.provider.digitalOcean.region"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Desired number of Instances
    #[serde(default)]
    pub replicas: u32,

    /// Fingerprint of the SSH key installed on new droplets
    #[serde(default)]
    pub ssh_fingerprint: String,

    /// URL of the cluster API server workers join (e.g. "https://10.0.0.2:6443")
    #[serde(default, rename = "clusterJoinURL")]
    pub cluster_join_url: String,

    /// Token presented by workers when joining the cluster
    #[serde(default)]
    pub cluster_join_token: String,

    /// Compute provider parameters
    #[serde(default)]
    pub provider: ProviderSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// DigitalOcean droplet parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_ocean: Option<DigitalOceanSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DigitalOceanSpec {
    /// Image slug (e.g. "ubuntu-22-04-x64")
    #[serde(default)]
    pub image: String,

    /// Droplet size slug (e.g. "s-2vcpu-4gb")
    #[serde(default)]
    pub instance_size: String,

    /// Region slug (e.g. "fra1")
    #[serde(default)]
    pub region: String,

    /// API token; falls back to the controller-wide token when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl Pool {
    /// True once the store has recorded a deletion request for this Pool
    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// DigitalOcean parameters, if configured
    pub fn digital_ocean(&self) -> Option<&DigitalOceanSpec> {
        self.spec.provider.digital_ocean.as_ref()
    }
}
