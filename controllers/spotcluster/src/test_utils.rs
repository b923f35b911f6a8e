//! Test utilities for unit testing reconcilers
//!
//! Builders for test resources and a harness wiring a [`Reconciler`] to the
//! in-memory store, the mock droplet provider and the mock bootstrap client.

use crate::credentials::{CredentialSync, ReloadSignal};
use crate::reconciler::provider::ProviderFactory;
use crate::reconciler::{BootstrapSettings, Reconciler};
use crate::store::mock::MockStore;
use crds::*;
use digitalocean_client::{ComputeProvider, MockDropletClient, ProviderError};
use k8s_openapi::api::core::v1::{Node, NodeSpec, Taint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use remote_bootstrap::MockBootstrap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Helper to create a test Pool with DigitalOcean settings
pub fn create_test_pool(name: &str, replicas: u32) -> Pool {
    Pool {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: PoolSpec {
            replicas,
            ssh_fingerprint: "3b:16:bf:e4:8b:00".to_string(),
            cluster_join_url: "https://10.0.0.2:6443".to_string(),
            cluster_join_token: "K10token".to_string(),
            provider: ProviderSpec {
                digital_ocean: Some(DigitalOceanSpec {
                    image: "ubuntu-22-04-x64".to_string(),
                    instance_size: "s-2vcpu-4gb".to_string(),
                    region: "fra1".to_string(),
                    api_key: String::new(),
                }),
            },
        },
    }
}

/// Helper to create a test Instance owned by `pool`, all flags false
pub fn create_test_instance(name: &str, pool: &str) -> Instance {
    Instance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                POOL_NAME_LABEL.to_string(),
                pool.to_string(),
            )])),
            finalizers: Some(vec![INSTANCE_FINALIZER.to_string()]),
            ..Default::default()
        },
        spec: InstanceSpec::default(),
    }
}

/// Helper to create a Node, optionally carrying a taint with `effect`
pub fn create_test_node(name: &str, taint_effect: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            taints: taint_effect.map(|effect| {
                vec![Taint {
                    key: "node.kubernetes.io/not-ready".to_string(),
                    effect: effect.to_string(),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Provider factory handing out the same mock for every token
pub struct StaticProviders(pub MockDropletClient);

impl ProviderFactory for StaticProviders {
    fn provider_for(&self, _token: Option<&str>) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
        Ok(Arc::new(self.0.clone()))
    }
}

/// A reconciler plus handles on all of its collaborators
pub struct TestHarness {
    pub store: Arc<MockStore>,
    pub provider: MockDropletClient,
    pub bootstrap: MockBootstrap,
    pub reload: ReloadSignal,
    pub reconciler: Reconciler,
    pub credential_file: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let credential_file = dir.path().join("node-passwd");
        let store = Arc::new(MockStore::new());
        let provider = MockDropletClient::new();
        let bootstrap = MockBootstrap::new();
        let reload = ReloadSignal::new();

        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(StaticProviders(provider.clone())),
            Arc::new(bootstrap.clone()),
            Arc::new(CredentialSync::new(&credential_file)),
            reload.clone(),
            BootstrapSettings {
                ssh_user: "root".to_string(),
                install_url: "https://get.k3s.io".to_string(),
                node_password_path: "/etc/rancher/node/password".to_string(),
            },
        );

        Self {
            store,
            provider,
            bootstrap,
            reload,
            reconciler,
            credential_file,
            _dir: dir,
        }
    }

    /// Stored uid of an Instance, used as its provider tag
    pub fn tag_of(&self, instance: &str) -> String {
        self.store
            .instance(instance)
            .and_then(|i| i.metadata.uid)
            .unwrap()
    }
}
