//! Remote bootstrap errors

use thiserror::Error;

/// Errors that can occur while bootstrapping a worker over a remote shell
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The remote address could not be parsed as `host[:port]`
    #[error("Invalid remote address: {0}")]
    InvalidAddress(String),

    /// The session could not be established
    #[error("Failed to connect to {address}: {message}")]
    Connect {
        address: String,
        message: String,
    },

    /// The transport failed while running a command
    #[error("Remote command '{command}' failed to run: {message}")]
    Transport {
        command: String,
        message: String,
    },

    /// The command ran and exited non-zero
    #[error("Remote command '{command}' exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Closing the session failed
    #[error("Failed to close session to {address}: {message}")]
    Close {
        address: String,
        message: String,
    },
}
