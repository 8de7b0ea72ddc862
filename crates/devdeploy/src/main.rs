//! devdeploy binary
//!
//! Development deploy of the robot core library and its test programs.

use clap::{ArgAction, Parser};
use devdeploy::config::default_base_dir;
use devdeploy::{
    deploy, Arch, BuildConfig, ConfigOverrides, DeployConfig, DeployError, DeployState, ExitStatus, PhaseError,
};
use devdeploy_ssh::FileError;
use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Deploy freshly built artifacts to a robot over SSH
#[derive(Debug, Parser)]
#[command(name = "devdeploy", version, about)]
struct Cli {
    /// Target architecture
    #[arg(value_enum)]
    arch: Arch,

    /// Build configuration
    #[arg(value_enum)]
    config: BuildConfig,

    /// Robot address
    #[arg(short = 'a', long = "address", value_name = "ADDRESS")]
    address: Option<String>,

    /// SSH username
    #[arg(short = 'u', long = "user", value_name = "USERNAME")]
    user: Option<String>,

    /// SSH password
    #[arg(short = 'p', long = "password", value_name = "PASSWORD", env = "DEVDEPLOY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// SSH port
    #[arg(short = 't', long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Directory to deploy to; its contents are deleted first
    #[arg(short = 'd', long = "deploy-dir", value_name = "DEPLOY_DIR")]
    deploy_dir: Option<String>,

    /// JSON file overriding the built-in defaults
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Directory artifact patterns are resolved against [default: directory of this executable]
    #[arg(long = "base-dir", value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.address.clone(),
            username: self.user.clone(),
            password: self.password.clone(),
            port: self.port,
            deploy_dir: self.deploy_dir.clone(),
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), PhaseError> {
    let config = match &cli.config_file {
        Some(path) => DeployConfig::from_file(path).map_err(|e| PhaseError::new(DeployState::Idle, e))?,
        None => DeployConfig::default(),
    }
    .with_overrides(cli.overrides());

    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => default_base_dir().map_err(|source| {
            PhaseError::new(
                DeployState::Idle,
                DeployError::File(FileError::LocalIOFailure {
                    path: PathBuf::from("."),
                    source,
                }),
            )
        })?,
    };
    debug!("Resolving artifacts against {}", base_dir.display());

    let plan = config
        .plan(cli.arch, cli.config, base_dir)
        .map_err(|e| PhaseError::new(DeployState::Idle, e))?;
    let report = deploy(&config, &plan)?;

    info!(
        "Done. Deployed {} files to {} on {}",
        report.transfer.files, plan.deploy_dir, report.hostname
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitStatus::Success.into(),
        Err(failure) => {
            error!("{}", failure);
            let mut source = failure.error.source();
            while let Some(cause) = source {
                debug!("Caused by: {}", cause);
                source = cause.source();
            }
            failure.exit_status().into()
        }
    }
}
