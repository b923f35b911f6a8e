//! Spotcluster CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the spotcluster controllers.
//!
//! - `Pool`: desired replica count and provider parameters for a group of workers
//! - `Instance`: one provisioned compute unit and its cluster-join progress

pub mod labels;
pub mod pool;
pub mod instance;

pub use labels::*;
pub use pool::*;
pub use instance::*;
