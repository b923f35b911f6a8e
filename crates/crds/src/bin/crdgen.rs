//! Prints the spotcluster CRDs as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let pool = serde_yaml::to_string(&crds::Pool::crd())?;
    let instance = serde_yaml::to_string(&crds::Instance::crd())?;

    print!("---\n{pool}---\n{instance}");
    Ok(())
}
