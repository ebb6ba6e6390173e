//! fleetdeck-exec: Remote shell layer
//!
//! Reaches fleet hosts over SSH: candidate address derivation, one-shot key
//! loading, command execution, interactive terminals and file transfer.

pub mod candidates;
pub mod error;
pub mod keys;
pub mod result;
pub mod sftp;
pub mod ssh;
pub mod terminal;
pub mod traits;

pub use candidates::{derive_ssh_host, ssh_candidates};
pub use error::ExecError;
pub use keys::{KeyError, KeySource, KeyStore};
pub use result::{CommandResult, SshSettings};
pub use sftp::RemoteFs;
pub use ssh::{SshSession, SshShell};
pub use terminal::{PtySize, TerminalBridge, TerminalEnds, TerminalInput, TerminalTarget};
pub use traits::{RemoteFiles, RemoteShell};
