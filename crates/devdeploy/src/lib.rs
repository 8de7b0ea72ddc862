//! # devdeploy
//!
//! Development deploy tool: connects to a target device over SSH, remounts
//! its root file system read-write, replaces the contents of a deploy
//! directory with freshly built artifacts, fixes up permissions and line
//! endings, then remounts read-only.
//!
//! Every step is blocking and strictly sequential. Failures propagate as
//! [`PhaseError`] values and map to stable process exit codes through
//! [`ExitStatus`].

#![warn(missing_docs)]

/// Error types and exit codes
pub mod error;

/// Configuration defaults, file loading and overrides
pub mod config;

/// Deployment state machine
pub mod orchestrator;

pub use config::{Arch, BuildConfig, ConfigOverrides, DeployConfig, DeployPlan};
pub use error::{DeployError, ExitStatus, PhaseError};
pub use orchestrator::{deploy, DeployReport, DeployState, Deployer};
