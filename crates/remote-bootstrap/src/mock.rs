//! Mock RemoteBootstrap for unit testing
//!
//! Records every command executed and answers with canned output keyed by
//! command prefix.

use crate::bootstrap_trait::{CommandOutput, RemoteBootstrap, RemoteSession, command_label};
use crate::error::BootstrapError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    /// (command prefix, stdout) pairs answered with exit code 0
    responses: Vec<(String, String)>,
    /// Command prefixes that exit non-zero
    failing: Vec<String>,
    /// Addresses that refuse connections
    unreachable: Vec<String>,
    /// (address, command) in execution order
    executed: Vec<(String, String)>,
}

/// Mock session factory
#[derive(Debug, Clone, Default)]
pub struct MockBootstrap {
    state: Arc<Mutex<MockState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBootstrap {
    /// Create a mock where every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `stdout`
    pub fn respond(&self, prefix: &str, stdout: &str) {
        lock(&self.state)
            .responses
            .push((prefix.to_string(), stdout.to_string()));
    }

    /// Make commands starting with `prefix` exit non-zero
    pub fn fail_command(&self, prefix: &str) {
        lock(&self.state).failing.push(prefix.to_string());
    }

    /// Stop failing commands; connections are allowed again too
    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.failing.clear();
        state.unreachable.clear();
    }

    /// Refuse sessions to `address`
    pub fn refuse_connections(&self, address: &str) {
        lock(&self.state).unreachable.push(address.to_string());
    }

    /// Commands executed so far as (address, command)
    pub fn executed(&self) -> Vec<(String, String)> {
        lock(&self.state).executed.clone()
    }

    /// Sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far
    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteBootstrap for MockBootstrap {
    async fn open_session(
        &self,
        _user: &str,
        address: &str,
    ) -> Result<Box<dyn RemoteSession>, BootstrapError> {
        if lock(&self.state).unreachable.iter().any(|a| a == address) {
            return Err(BootstrapError::Connect {
                address: address.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
            address: address.to_string(),
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    state: Arc<Mutex<MockState>>,
    closed: Arc<AtomicUsize>,
    address: String,
}

#[async_trait::async_trait]
impl RemoteSession for MockSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, BootstrapError> {
        let mut state = lock(&self.state);
        state
            .executed
            .push((self.address.clone(), command.to_string()));

        if state.failing.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(BootstrapError::CommandFailed {
                command: command_label(command).to_string(),
                exit_code: Some(1),
                stderr: "mock failure".to_string(),
            });
        }

        let stdout = state
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), BootstrapError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
