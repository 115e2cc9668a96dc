//! Remote command channel over SSH
//!
//! One authenticated session per diagnosis request:
//!
//! ```text
//! SshConnector::open(target) ──► SshChannel
//!                                   │
//!                    execute(cmd, 30s) ──► exec channel ──► stdout/stderr/exit
//!                                   │
//!                                close() (idempotent)
//! ```
//!
//! Execution failures are never fatal to a session: the caller turns them
//! into an `[ERROR]` result with exit status `-1` that the model can read.

pub mod channel;
pub mod client;

pub use channel::{
    format_command_output, ChannelConnector, CommandOutput, ConnectionError,
    ExecutionError, RemoteChannel, SshTarget, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_SSH_PORT, FAILURE_EXIT_CODE,
};
pub use client::{SshChannel, SshConnector};
