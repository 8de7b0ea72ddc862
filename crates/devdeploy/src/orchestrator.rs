//! Deployment sequencing
//!
//! A run moves through a fixed, linear set of states. Each transition issues
//! one or more remote commands or a tree transfer; the first failure ends the
//! run in the state it had reached. Nothing is rolled back, so a run that
//! fails after remounting can leave the target file system writable.

use crate::config::{DeployConfig, DeployPlan};
use crate::{DeployError, PhaseError};
use devdeploy_ssh::{
    authenticate, connect, probe_capability, run_or_fail, Mirror, RemoteHost, TransferSummary,
};
use std::fmt;
use tracing::{debug, info};

const REMOUNT_RW: &str = "sudo mount -o rw,remount /";
const REMOUNT_RO: &str = "sudo mount -o ro,remount /";

/// Progress of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeployState {
    /// Nothing done yet
    Idle,
    /// TCP connection open
    Connected,
    /// Logged in
    Authenticated,
    /// Root file system remounted read-write
    FilesystemWritable,
    /// Deploy directory exists and is empty
    DeployDirCleared,
    /// All artifacts copied
    ArtifactsTransferred,
    /// Executables marked and line endings fixed
    PermissionsFixed,
    /// Root file system remounted read-only
    FilesystemReadOnly,
    /// Run complete
    Done,
}

impl DeployState {
    /// What the run does to enter this state, for operator messages
    pub fn activity(self) -> &'static str {
        match self {
            Self::Idle => "Preparing the deployment",
            Self::Connected => "Connecting to the target",
            Self::Authenticated => "Logging in",
            Self::FilesystemWritable => "Making the filesystem writable",
            Self::DeployDirCleared => "Removing old deploy directory contents",
            Self::ArtifactsTransferred => "Copying files",
            Self::PermissionsFixed => "Fixing permissions and line endings",
            Self::FilesystemReadOnly => "Making the filesystem read-only",
            Self::Done => "Finishing",
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Hostname reported by the target
    pub hostname: String,
    /// Transfer totals
    pub transfer: TransferSummary,
    /// State the run ended in
    pub state: DeployState,
}

/// Drives an authenticated host through the deployment states
pub struct Deployer<'a, H: RemoteHost> {
    host: &'a mut H,
    plan: &'a DeployPlan,
    state: DeployState,
}

impl<'a, H: RemoteHost> Deployer<'a, H> {
    /// Start from an already authenticated host
    pub fn new(host: &'a mut H, plan: &'a DeployPlan) -> Self {
        Self {
            host,
            plan,
            state: DeployState::Authenticated,
        }
    }

    /// State reached so far
    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Run every remaining transition in order
    pub fn run(&mut self) -> Result<DeployReport, PhaseError> {
        // The clear step deletes everything below the deploy directory.
        if self.plan.deploy_dir.is_top() {
            return Err(PhaseError::new(
                DeployState::DeployDirCleared,
                DeployError::UnsafeDeployDir {
                    dir: self.plan.deploy_dir.to_string(),
                },
            ));
        }

        let hostname = run_or_fail(self.host, "hostname")
            .map_err(|e| PhaseError::new(DeployState::Authenticated, e))?
            .trim()
            .to_string();
        info!("SSH session established with {}.", hostname);

        self.enter(DeployState::FilesystemWritable, |d| d.command(REMOUNT_RW))?;

        self.enter(DeployState::DeployDirCleared, |d| {
            let dir = d.plan.deploy_dir.shell_quoted();
            d.command(&format!("mkdir -p {dir}; sudo rm -rf {dir}/*"))
        })?;

        let mut transfer = TransferSummary::default();
        self.enter(DeployState::ArtifactsTransferred, |d| {
            let plan = d.plan;
            let fs = d.host.open_fs()?;
            transfer = Mirror::new(&fs, &plan.base_dir)
                .with_buffer_size(plan.buffer_size)
                .send(&plan.artifacts, &plan.deploy_dir)?;
            info!("Copied {} files ({} bytes)", transfer.files, transfer.bytes);
            Ok(())
        })?;

        self.enter(DeployState::PermissionsFixed, |d| {
            let plan = d.plan;
            for name in &plan.executables {
                let path = plan.deploy_dir.join(name);
                d.command(&format!("chmod +x {}", path.shell_quoted()))?;
            }
            for name in &plan.scripts {
                let path = plan.deploy_dir.join(name);
                d.command(&format!(r"sed -i 's/\r$//' {}", path.shell_quoted()))?;
            }
            Ok(())
        })?;

        self.enter(DeployState::FilesystemReadOnly, |d| d.command(REMOUNT_RO))?;

        self.state = DeployState::Done;
        Ok(DeployReport {
            hostname,
            transfer,
            state: self.state,
        })
    }

    fn command(&mut self, command: &str) -> Result<(), DeployError> {
        run_or_fail(self.host, command)?;
        Ok(())
    }

    /// Perform one transition; the state only advances if `step` succeeds
    fn enter<F>(&mut self, next: DeployState, step: F) -> Result<(), PhaseError>
    where
        F: FnOnce(&mut Self) -> Result<(), DeployError>,
    {
        info!("{}.", next.activity());
        step(self).map_err(|error| PhaseError::new(next, error))?;
        debug!("{} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Connect, authenticate and run a full deployment
///
/// The session is closed whether or not the run succeeds.
pub fn deploy(config: &DeployConfig, plan: &DeployPlan) -> Result<DeployReport, PhaseError> {
    probe_capability().map_err(|e| {
        PhaseError::new(DeployState::Idle, DeployError::MissingCapability(e.to_string()))
    })?;

    let ssh = config.ssh_config();
    let stream = connect(&ssh.host, ssh.port, ssh.connect_timeout)
        .map_err(|e| PhaseError::new(DeployState::Connected, e))?;
    let mut session = authenticate(stream, &ssh.username, &ssh.password, ssh.session_timeout)
        .map_err(|e| PhaseError::new(DeployState::Authenticated, e))?;

    let result = Deployer::new(&mut session, plan).run();

    info!("Closing session");
    session.disconnect();
    result
}
