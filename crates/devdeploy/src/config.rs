//! Deployment configuration
//!
//! Values are layered: compiled-in defaults, then an optional JSON file, then
//! command line overrides.

use crate::DeployError;
use clap::ValueEnum;
use devdeploy_ssh::{RemotePath, SshConfig, COPY_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Target CPU architecture of the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 32-bit Raspberry Pi (ARMv6)
    #[value(name = "armv6")]
    Armv6,
    /// 64-bit ARM
    #[value(name = "aarch64")]
    Aarch64,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Armv6 => "armv6",
            Self::Aarch64 => "aarch64",
        })
    }
}

/// CMake build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum BuildConfig {
    /// No optimisation, full debug info
    #[value(name = "Debug")]
    Debug,
    /// Optimised
    #[value(name = "Release")]
    Release,
    /// Optimised with debug info
    #[value(name = "RelWithDebInfo")]
    RelWithDebInfo,
    /// Optimised for size
    #[value(name = "MinSizeRel")]
    MinSizeRel,
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        })
    }
}

/// Tool configuration
///
/// Artifact patterns may contain `{arch}` and `{config}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Target host address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// SSH username
    pub username: String,
    /// SSH password
    pub password: String,
    /// Remote directory that is cleared and repopulated on every run
    pub deploy_dir: String,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Timeout for every later session operation in seconds
    pub session_timeout_secs: u64,
    /// Chunk size for file copies in bytes
    pub buffer_size: usize,
    /// Glob patterns of artifacts to transfer, relative to the base directory
    pub artifacts: Vec<String>,
    /// Deployed files (relative to the deploy directory) to mark executable
    pub executables: Vec<String>,
    /// Deployed shell scripts whose carriage returns are stripped
    pub scripts: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            host: "192.168.10.1".to_string(),
            port: 22,
            username: "arpirobot".to_string(),
            password: "arpirobot".to_string(),
            deploy_dir: "/home/arpirobot/CoreLib-Test".to_string(),
            connect_timeout_secs: 3,
            session_timeout_secs: 10,
            buffer_size: COPY_BUFFER_SIZE,
            artifacts: vec![
                "cpp_library/build/{arch}/{config}/*.so".to_string(),
                "cpp_library/build/{arch}/{config}/testrobot".to_string(),
                "python_bindings/arpirobot/".to_string(),
                "python_bindings/testrobot-py/".to_string(),
                "start-cpp.sh".to_string(),
                "start-py.sh".to_string(),
            ],
            executables: vec![
                "start-cpp.sh".to_string(),
                "start-py.sh".to_string(),
                "testrobot".to_string(),
            ],
            scripts: vec!["start-cpp.sh".to_string(), "start-py.sh".to_string()],
        }
    }
}

/// Values given on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Target host address
    pub host: Option<String>,
    /// SSH username
    pub username: Option<String>,
    /// SSH password
    pub password: Option<String>,
    /// SSH port
    pub port: Option<u16>,
    /// Remote deploy directory
    pub deploy_dir: Option<String>,
}

impl DeployConfig {
    /// Load a configuration file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, DeployError> {
        let contents = std::fs::read_to_string(path).map_err(|e| DeployError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| DeployError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let invalid = |message: &str| DeployError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if config.connect_timeout_secs == 0 || config.session_timeout_secs == 0 {
            return Err(invalid("timeouts must be at least one second"));
        }
        if config.buffer_size == 0 {
            return Err(invalid("buffer_size must not be zero"));
        }
        Ok(config)
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(username) = overrides.username {
            self.username = username;
        }
        if let Some(password) = overrides.password {
            self.password = password;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(deploy_dir) = overrides.deploy_dir {
            self.deploy_dir = deploy_dir;
        }
        self
    }

    /// SSH settings for the connection manager
    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            session_timeout: Duration::from_secs(self.session_timeout_secs),
        }
    }

    /// Resolve the artifact list for one build
    ///
    /// A deploy directory that normalises to `/` or the empty path is
    /// rejected, since its contents are deleted on every run.
    pub fn plan(&self, arch: Arch, build: BuildConfig, base_dir: PathBuf) -> Result<DeployPlan, DeployError> {
        let deploy_dir = RemotePath::new(&self.deploy_dir);
        if deploy_dir.is_top() {
            return Err(DeployError::UnsafeDeployDir {
                dir: self.deploy_dir.clone(),
            });
        }

        let arch = arch.to_string();
        let build = build.to_string();

        Ok(DeployPlan {
            deploy_dir,
            base_dir,
            artifacts: self
                .artifacts
                .iter()
                .map(|p| p.replace("{arch}", &arch).replace("{config}", &build))
                .collect(),
            executables: self.executables.clone(),
            scripts: self.scripts.clone(),
            buffer_size: self.buffer_size,
        })
    }
}

/// Everything the orchestrator needs once connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    /// Remote directory receiving the artifacts
    pub deploy_dir: RemotePath,
    /// Local directory the artifact patterns are resolved against
    pub base_dir: PathBuf,
    /// Expanded artifact glob patterns, in transfer order
    pub artifacts: Vec<String>,
    /// Files to `chmod +x`, relative to the deploy directory
    pub executables: Vec<String>,
    /// Scripts to strip of carriage returns, relative to the deploy directory
    pub scripts: Vec<String>,
    /// Copy chunk size
    pub buffer_size: usize,
}

/// Directory containing the running executable
///
/// Artifact patterns are resolved here so the result does not depend on the
/// caller's working directory.
pub fn default_base_dir() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?.canonicalize()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "executable has no parent directory")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.host, "192.168.10.1");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "arpirobot");
        assert_eq!(config.password, "arpirobot");
        assert_eq!(config.deploy_dir, "/home/arpirobot/CoreLib-Test");
        assert_eq!(config.buffer_size, 1024 * 1024);
        assert_eq!(config.scripts.len(), 2);
    }

    #[test]
    fn test_ssh_config_timeouts() {
        let ssh = DeployConfig::default().ssh_config();
        assert_eq!(ssh.connect_timeout, Duration::from_secs(3));
        assert_eq!(ssh.session_timeout, Duration::from_secs(10));
        assert!(ssh.connect_timeout < ssh.session_timeout);
        assert_eq!(ssh.address(), "192.168.10.1:22");
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        let config = DeployConfig::default().with_overrides(ConfigOverrides {
            host: Some("10.0.0.7".to_string()),
            port: Some(2222),
            ..Default::default()
        });

        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 2222);
        assert_eq!(config.username, "arpirobot");
        assert_eq!(config.deploy_dir, "/home/arpirobot/CoreLib-Test");
    }

    #[test]
    fn test_plan_expands_placeholders() {
        let plan = DeployConfig::default().plan(
            Arch::Aarch64,
            BuildConfig::RelWithDebInfo,
            PathBuf::from("/opt/tool"),
        )
        .unwrap();

        assert_eq!(plan.artifacts[0], "cpp_library/build/aarch64/RelWithDebInfo/*.so");
        assert_eq!(plan.artifacts[1], "cpp_library/build/aarch64/RelWithDebInfo/testrobot");
        assert_eq!(plan.deploy_dir.as_str(), "/home/arpirobot/CoreLib-Test");
        assert_eq!(plan.base_dir, PathBuf::from("/opt/tool"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "host": "robot.local", "deploy_dir": "/srv/robot" }}"#).unwrap();

        let config = DeployConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "robot.local");
        assert_eq!(config.deploy_dir, "/srv/robot");
        assert_eq!(config.port, 22);
        assert_eq!(config.artifacts, DeployConfig::default().artifacts);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "hots": "typo" }}"#).unwrap();

        let result = DeployConfig::from_file(file.path());
        assert!(matches!(result, Err(DeployError::Config { .. })));

        let missing = DeployConfig::from_file(Path::new("/nonexistent/devdeploy.json"));
        assert!(matches!(missing, Err(DeployError::Config { .. })));
    }

    #[test]
    fn test_top_level_deploy_dir_is_rejected() {
        for dir in [".", "./", "", "/", "//", "/./"] {
            let mut config = DeployConfig::default();
            config.deploy_dir = dir.to_string();

            let result = config.plan(Arch::Armv6, BuildConfig::Release, PathBuf::from("/opt/tool"));
            match result {
                Err(err @ DeployError::UnsafeDeployDir { .. }) => {
                    assert_eq!(err.exit_status().code(), 4, "{:?}", dir);
                }
                other => panic!("expected UnsafeDeployDir for {:?}, got {:?}", dir, other),
            }
        }

        let mut config = DeployConfig::default();
        config.deploy_dir = "./CoreLib-Test".to_string();
        let plan = config
            .plan(Arch::Armv6, BuildConfig::Release, PathBuf::from("/opt/tool"))
            .unwrap();
        assert_eq!(plan.deploy_dir.as_str(), "CoreLib-Test");
    }

    #[test]
    fn test_zero_timeout_or_buffer_is_config_error() {
        for body in [
            r#"{ "session_timeout_secs": 0 }"#,
            r#"{ "connect_timeout_secs": 0 }"#,
            r#"{ "buffer_size": 0 }"#,
        ] {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", body).unwrap();

            let result = DeployConfig::from_file(file.path());
            assert!(matches!(result, Err(DeployError::Config { .. })), "{}", body);
        }
    }

    #[test]
    fn test_value_enum_spellings() {
        assert_eq!(Arch::from_str("armv6", false).unwrap(), Arch::Armv6);
        assert_eq!(BuildConfig::from_str("MinSizeRel", false).unwrap(), BuildConfig::MinSizeRel);
        assert!(BuildConfig::from_str("release-fast", false).is_err());
        assert_eq!(BuildConfig::RelWithDebInfo.to_string(), "RelWithDebInfo");
    }
}
