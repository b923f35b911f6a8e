//! DigitalOcean Droplet API Client
//!
//! A small client for the parts of the DigitalOcean REST API the spotcluster
//! controllers need: create a droplet, find a droplet by its unique tag and
//! delete a droplet by its unique tag.
//!
//! # Example
//!
//! ```no_run
//! use digitalocean_client::{ComputeProvider, CreateDropletRequest, DigitalOceanClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DigitalOceanClient::new(
//!     "https://api.digitalocean.com".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! let droplet = client.create(&CreateDropletRequest {
//!     name: "workers-x7k2p".to_string(),
//!     region: "fra1".to_string(),
//!     size: "s-2vcpu-4gb".to_string(),
//!     image: "ubuntu-22-04-x64".to_string(),
//!     tag: "0b6a1f8e-0a43-4c0e-9b7e-5d3f1c2a9e41".to_string(),
//!     ssh_fingerprint: "3b:16:bf:e4:8b:00:8b:b8:59:8c:a9:d3:f0:19:45:fa".to_string(),
//! }).await?;
//!
//! if let Some(found) = client.find_by_tag("0b6a1f8e-0a43-4c0e-9b7e-5d3f1c2a9e41").await? {
//!     println!("{} running={}", found.name, found.running);
//! }
//! # let _ = droplet;
//! # Ok(())
//! # }
//! ```
//!
//! A tag is expected to identify at most one droplet. Zero matches is a normal
//! outcome for every operation; more than one is reported as
//! [`ProviderError::AmbiguousTag`].

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provider_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::DigitalOceanClient;
pub use common::HttpClient;
pub use error::ProviderError;
pub use models::*;
pub use provider_trait::ComputeProvider;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockDropletClient;
