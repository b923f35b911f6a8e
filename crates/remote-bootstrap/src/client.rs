//! OpenSSH-backed bootstrap client
//!
//! Sessions are multiplexed over the system `ssh` binary using a control
//! master per connection. Host keys are not checked since droplets are
//! freshly created and their keys unknown in advance.

use crate::bootstrap_trait::{CommandOutput, RemoteBootstrap, RemoteSession, command_label};
use crate::error::BootstrapError;
use openssh::{KnownHosts, Session, SessionBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default time allowed for establishing a session
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_SSH_PORT: u16 = 22;

/// Bootstrap client authenticating with a private key file
#[derive(Debug, Clone)]
pub struct SshBootstrapClient {
    keyfile: PathBuf,
    connect_timeout: Duration,
}

impl SshBootstrapClient {
    /// Create a client using the private key at `keyfile`
    pub fn new(keyfile: impl Into<PathBuf>) -> Self {
        Self {
            keyfile: keyfile.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connection timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Splits "host:port" into its parts; the port defaults to 22
pub fn parse_address(address: &str) -> Result<(String, u16), BootstrapError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(BootstrapError::InvalidAddress("empty address".to_string()));
    }

    // Bracketed IPv6, e.g. "[2001:db8::1]:22"
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| BootstrapError::InvalidAddress(address.to_string()))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(address, port)?,
            None if tail.is_empty() => DEFAULT_SSH_PORT,
            None => return Err(BootstrapError::InvalidAddress(address.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match address.split_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), parse_port(address, port)?)),
        Some(_) => Err(BootstrapError::InvalidAddress(address.to_string())),
        None => Ok((address.to_string(), DEFAULT_SSH_PORT)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, BootstrapError> {
    port.parse()
        .map_err(|_| BootstrapError::InvalidAddress(address.to_string()))
}

#[async_trait::async_trait]
impl RemoteBootstrap for SshBootstrapClient {
    async fn open_session(
        &self,
        user: &str,
        address: &str,
    ) -> Result<Box<dyn RemoteSession>, BootstrapError> {
        let (host, port) = parse_address(address)?;
        debug!("Opening session to {}@{}:{}", user, host, port);

        let session = SessionBuilder::default()
            .keyfile(&self.keyfile)
            .user(user.to_string())
            .port(port)
            .known_hosts_check(KnownHosts::Accept)
            .user_known_hosts_file("/dev/null")
            .connect_timeout(self.connect_timeout)
            .connect_mux(&host)
            .await
            .map_err(|e| BootstrapError::Connect {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        Ok(Box::new(SshSession {
            session,
            address: address.to_string(),
        }))
    }
}

/// A live multiplexed session
#[derive(Debug)]
struct SshSession {
    session: Session,
    address: String,
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, BootstrapError> {
        let label = command_label(command);
        debug!("Running {} on {}", label, self.address);

        let output = self
            .session
            .raw_command(command)
            .output()
            .await
            .map_err(|e| BootstrapError::Transport {
                command: label.to_string(),
                message: e.to_string(),
            })?;

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if !output.success() {
            return Err(BootstrapError::CommandFailed {
                command: label.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    async fn close(self: Box<Self>) -> Result<(), BootstrapError> {
        let address = self.address;
        self.session
            .close()
            .await
            .map_err(|e| BootstrapError::Close {
                address,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("203.0.113.7:22").unwrap(), ("203.0.113.7".to_string(), 22));
        assert_eq!(parse_address("203.0.113.7").unwrap(), ("203.0.113.7".to_string(), 22));
        assert_eq!(parse_address("node-1:2222").unwrap(), ("node-1".to_string(), 2222));
        assert_eq!(parse_address("[2001:db8::1]:2200").unwrap(), ("2001:db8::1".to_string(), 2200));
        assert_eq!(parse_address("[2001:db8::1]").unwrap(), ("2001:db8::1".to_string(), 22));
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(matches!(parse_address(""), Err(BootstrapError::InvalidAddress(_))));
        assert!(matches!(parse_address(":22"), Err(BootstrapError::InvalidAddress(_))));
        assert!(matches!(parse_address("host:ssh"), Err(BootstrapError::InvalidAddress(_))));
        assert!(matches!(parse_address("[::1"), Err(BootstrapError::InvalidAddress(_))));
    }

    #[test]
    fn test_default_timeout_is_ten_minutes() {
        let client = SshBootstrapClient::new("/tmp/id_rsa");
        assert_eq!(client.connect_timeout, Duration::from_secs(600));
        let client = client.with_connect_timeout(Duration::from_secs(5));
        assert_eq!(client.connect_timeout, Duration::from_secs(5));
    }
}
