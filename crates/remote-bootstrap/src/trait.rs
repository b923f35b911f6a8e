//! RemoteBootstrap trait for mocking
//!
//! The concrete SSH client implements these traits; tests use
//! [`crate::mock::MockBootstrap`].

use crate::error::BootstrapError;
use tracing::warn;

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the remote side was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Program name of a shell command, used in errors and logs so that
/// arguments carrying secrets are never echoed.
pub fn command_label(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

/// An open remote shell session
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` through the remote shell
    ///
    /// A non-zero exit is reported as [`BootstrapError::CommandFailed`].
    async fn execute(&self, command: &str) -> Result<CommandOutput, BootstrapError>;

    /// Tear the session down
    async fn close(self: Box<Self>) -> Result<(), BootstrapError>;
}

/// Factory for remote shell sessions
#[async_trait::async_trait]
pub trait RemoteBootstrap: Send + Sync {
    /// Open a session as `user` to `address` ("host:port", port defaults to 22)
    async fn open_session(
        &self,
        user: &str,
        address: &str,
    ) -> Result<Box<dyn RemoteSession>, BootstrapError>;

    /// Open a session, run one command and close the session again
    ///
    /// The session is closed whether or not the command succeeded; a close
    /// failure after a successful command is logged, not returned.
    async fn run_command(
        &self,
        user: &str,
        address: &str,
        command: &str,
    ) -> Result<CommandOutput, BootstrapError> {
        let session = self.open_session(user, address).await?;
        let result = session.execute(command).await;
        if let Err(e) = session.close().await {
            warn!("{}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_label_hides_arguments() {
        assert_eq!(command_label("curl -sfL https://get.k3s.io | K3S_TOKEN='x' sh -"), "curl");
        assert_eq!(command_label("  cat /etc/rancher/node/password"), "cat");
        assert_eq!(command_label(""), "");
    }

    #[test]
    fn test_success_requires_zero_exit() {
        let mut output = CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(output.success());
        output.exit_code = Some(1);
        assert!(!output.success());
        output.exit_code = None;
        assert!(!output.success());
    }
}
