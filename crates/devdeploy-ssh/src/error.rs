//! SSH-specific error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while establishing or authenticating the session
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect did not complete within the connect timeout
    #[error("Timed out while connecting to {addr}")]
    Timeout {
        /// Address that was being dialed
        addr: String,
    },

    /// TCP connect failed outright (refused, unresolvable, unreachable)
    #[error("Unable to reach {addr}: {source}")]
    Unreachable {
        /// Address that was being dialed
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The connected socket rejected its read/write timeouts
    #[error("Unable to configure the connection to {addr}: {source}")]
    SocketSetup {
        /// Peer address
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// SSH handshake or credential check failed
    #[error("Authentication failed for user {user}")]
    AuthFailed {
        /// User that attempted to log in
        user: String,
        /// Underlying libssh2 error
        #[source]
        source: ssh2::Error,
    },
}

/// Failures while running a remote command
#[derive(Debug, Error)]
pub enum CommandError {
    /// The channel could not be opened, executed, or drained
    #[error("Executing command `{command}` failed: {source}")]
    TransportFailure {
        /// Command line that was being run
        command: String,
        /// Underlying transport error
        #[source]
        source: io::Error,
    },

    /// The command ran but exited with a non-zero status
    #[error("Command `{command}` failed with exit code {code}")]
    NonZeroExit {
        /// Command line that was run
        command: String,
        /// Exit status reported by the remote side
        code: i32,
        /// Captured stderr, kept for diagnostics
        stderr: String,
    },
}

/// Failures during local or remote file operations
#[derive(Debug, Error)]
pub enum FileError {
    /// A local file or directory could not be read
    #[error("Local I/O failed on {}: {source}", .path.display())]
    LocalIOFailure {
        /// Local path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A remote file could not be opened or written
    #[error("Remote I/O failed on {path}: {source}")]
    RemoteIOFailure {
        /// Remote path involved
        path: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// No ancestor of the path could be created
    #[error("Unable to create directory {path} on remote host")]
    DirectoryCreationFailed {
        /// Remote directory that was requested
        path: String,
    },

    /// The SFTP subsystem could not be started on the session
    #[error("Failed to open SFTP session: {source}")]
    SftpUnavailable {
        /// Underlying libssh2 error
        #[source]
        source: ssh2::Error,
    },
}

impl FileError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIOFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remote(path: impl ToString, source: io::Error) -> Self {
        Self::RemoteIOFailure {
            path: path.to_string(),
            source,
        }
    }
}
