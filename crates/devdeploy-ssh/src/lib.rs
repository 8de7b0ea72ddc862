//! # devdeploy SSH layer
//!
//! Blocking SSH/SFTP building blocks for pushing build artifacts to a device:
//! session setup, remote command execution, recursive remote directory
//! creation and local-to-remote tree mirroring.

#![warn(missing_docs)]

/// SSH connection management
pub mod connection;

/// Remote command execution
pub mod exec;

/// Remote file system abstraction and its SFTP implementation
pub mod fs;

/// Remote path handling
pub mod path;

/// Recursive remote directory creation
pub mod materialize;

/// Local-to-remote tree mirroring
pub mod mirror;

/// SSH-specific error types
pub mod error;

/// In-memory remote host for tests
pub mod test_utils;

pub use connection::{authenticate, connect, open_session, probe_capability, ConnectionInfo, RemoteSession, SshConfig};
pub use error::{CommandError, ConnectionError, FileError};
pub use exec::{run, run_or_fail, CommandResult, RemoteShell};
pub use fs::{RemoteFs, RemoteHost, SftpFs, DIR_MODE, FILE_MODE};
pub use materialize::ensure_directory;
pub use mirror::{copy_file, send, Mirror, TransferSummary, COPY_BUFFER_SIZE};
pub use path::RemotePath;
