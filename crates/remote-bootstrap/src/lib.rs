//! Remote bootstrap of cluster workers
//!
//! Opens authenticated remote shell sessions to freshly provisioned droplets
//! and runs the commands that join them to the cluster.
//!
//! # Example
//!
//! ```no_run
//! use remote_bootstrap::{RemoteBootstrap, SshBootstrapClient, join_command};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SshBootstrapClient::new("/etc/spotcluster/id_rsa");
//! let command = join_command(
//!     "https://get.k3s.io",
//!     "https://10.0.0.2:6443",
//!     "K10secret",
//! );
//! let output = client.run_command("root", "203.0.113.7:22", &command).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod error;
#[path = "trait.rs"]
pub mod bootstrap_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use bootstrap_trait::{CommandOutput, RemoteBootstrap, RemoteSession};
pub use client::{DEFAULT_CONNECT_TIMEOUT, SshBootstrapClient};
pub use commands::{DEFAULT_INSTALL_URL, DEFAULT_NODE_PASSWORD_PATH, join_command, read_password_command, shell_quote};
pub use error::BootstrapError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockBootstrap;
