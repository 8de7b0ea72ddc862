//! Error types for the deploy tool

use crate::orchestrator::DeployState;
use devdeploy_ssh::{CommandError, ConnectionError, FileError};
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can end a deployment run
#[derive(Debug, Error)]
pub enum DeployError {
    /// The SSH client library could not be initialised
    #[error("SSH client library unavailable: {0}")]
    MissingCapability(String),

    /// Connecting or logging in failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A remote command failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A local or remote file operation failed
    #[error(transparent)]
    File(#[from] FileError),

    /// A configuration file could not be read or parsed
    #[error("Invalid configuration file {}: {message}", .path.display())]
    Config {
        /// Configuration file path
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// The deploy directory would resolve to a top-level directory
    #[error("Refusing to deploy to {dir:?}: the deploy directory must name a subdirectory")]
    UnsafeDeployDir {
        /// Deploy directory as configured
        dir: String,
    },
}

/// Process exit codes, a stable contract for calling scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Deployment finished
    Success = 0,
    /// Required remote-access capability unavailable at startup
    MissingCapability = 1,
    /// Connection or authentication failure
    Connection = 2,
    /// A remote command failed
    Command = 3,
    /// A local or remote file or directory operation failed
    File = 4,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

impl DeployError {
    /// Exit status this error maps to
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::MissingCapability(_) => ExitStatus::MissingCapability,
            Self::Connection(_) => ExitStatus::Connection,
            Self::Command(_) => ExitStatus::Command,
            Self::File(_) | Self::Config { .. } | Self::UnsafeDeployDir { .. } => ExitStatus::File,
        }
    }
}

/// A [`DeployError`] together with the state the run was trying to enter
#[derive(Debug, Error)]
#[error("{} failed: {error}", .phase.activity())]
pub struct PhaseError {
    /// State that was not reached
    pub phase: DeployState,
    /// Underlying failure
    #[source]
    pub error: DeployError,
}

impl PhaseError {
    /// Attach a phase to an error
    pub fn new(phase: DeployState, error: impl Into<DeployError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }

    /// Exit status for the process
    pub fn exit_status(&self) -> ExitStatus {
        self.error.exit_status()
    }
}
