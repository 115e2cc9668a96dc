//! Remote command channel abstraction
//!
//! The diagnosis loop only talks to [`RemoteChannel`]; the SSH implementation
//! lives in [`super::client`]. Keeping the seam as a trait lets the loop be
//! driven by in-memory doubles in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Deadline for TCP connect + handshake + authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single remote command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit status reported for blocked commands and execution failures
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Text returned when a command printed nothing
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no command output)";

/// Connection parameters for the target host
#[derive(Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SshTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep the password out of logs
impl fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Captured result of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined, trimmed output as shown to the model
    pub text: String,
    /// Process exit status, or [`FAILURE_EXIT_CODE`]
    pub exit_code: i32,
}

impl CommandOutput {
    /// Build the result for a finished process from its raw streams
    pub fn from_streams(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            text: format_command_output(stdout, stderr, exit_code),
            exit_code,
        }
    }

    /// Result reported in place of a command the safety filter refused
    pub fn blocked(command: &str) -> Self {
        Self {
            text: format!("[BLOCKED] Dangerous command blocked: {}", command),
            exit_code: FAILURE_EXIT_CODE,
        }
    }

    /// Result reported in place of a command that could not be run
    pub fn failed(error: &ExecutionError) -> Self {
        Self {
            text: format!("[ERROR] Command execution failed: {}", error),
            exit_code: FAILURE_EXIT_CODE,
        }
    }
}

/// Error establishing the remote session. Fatal to the request.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("TCP connect to {addr} failed: {source}")]
    Tcp {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("SSH handshake failed: {0}")]
    Handshake(String),
    #[error("SSH authentication failed for user '{0}'")]
    Auth(String),
    #[error("connection timed out after {0} seconds")]
    Timeout(u64),
    #[error("connection task failed: {0}")]
    Task(String),
}

/// Error running a single command. Recovered into the transcript.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("command timed out after {0} seconds")]
    Timeout(u64),
    #[error("SSH error: {0}")]
    Ssh(String),
    #[error("remote channel is closed")]
    Closed,
    #[error("execution task failed: {0}")]
    Task(String),
}

/// An open session to one target host
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run `command` and capture its output, bounded by `timeout`.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ExecutionError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self);
}

/// Opens [`RemoteChannel`]s
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(
        &self,
        target: &SshTarget,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteChannel>, ConnectionError>;
}

/// Combine stdout and stderr the way the model sees them.
///
/// stderr is only surfaced for failed commands.
pub fn format_command_output(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();

    if exit_code != 0 && !stderr.is_empty() {
        return format!("{}\n[STDERR] {}", stdout, stderr).trim().to_string();
    }
    if stdout.is_empty() {
        NO_OUTPUT_PLACEHOLDER.to_string()
    } else {
        stdout.to_string()
    }
}
