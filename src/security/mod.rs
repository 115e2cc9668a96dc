//! Security module for remote diagnosis sessions
//!
//! The agent runs commands chosen by a language model on a production host,
//! so every proposal is vetted before it leaves the process:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Reasoning backend ──► execute_ssh_command(command, reason)     │
//! │                                  │                              │
//! │                                  ▼                              │
//! │                    CommandFilter::is_dangerous                  │
//! │                     │                       │                   │
//! │                  blocked                  allowed               │
//! │                     ▼                       ▼                   │
//! │          "[BLOCKED] ..." exit -1    RemoteChannel::execute      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no bypass: the filter sits directly in front of the channel in
//! the diagnosis loop.

pub mod command_filter;

pub use command_filter::{is_dangerous, CommandFilter};
