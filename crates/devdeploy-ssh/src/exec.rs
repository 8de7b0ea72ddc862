//! Remote command execution

use crate::{CommandError, RemoteSession};
use bytes::Bytes;
use std::io::{self, Read};
use tracing::debug;

/// Outcome of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit status reported by the remote side
    pub exit_code: i32,
    /// Everything the command wrote to stdout
    pub stdout: Bytes,
    /// Everything the command wrote to stderr
    pub stderr: Bytes,
}

impl CommandResult {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded as UTF-8, replacing invalid sequences
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded as UTF-8, replacing invalid sequences
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Something that can run a command on the remote host to completion
pub trait RemoteShell {
    /// Run `command` and collect its output and exit status
    ///
    /// An `Err` means the transport failed; a command that ran and failed is
    /// an `Ok` with a non-zero `exit_code`.
    fn exec(&mut self, command: &str) -> io::Result<CommandResult>;
}

impl RemoteShell for RemoteSession {
    fn exec(&mut self, command: &str) -> io::Result<CommandResult> {
        // One channel per command so each result is attributable.
        let mut channel = self.session().channel_session()?;
        channel.exec(command)?;

        // Drain stdout fully, then stderr. Only safe for commands that
        // terminate on their own without interaction.
        let mut stdout = Vec::new();
        channel.read_to_end(&mut stdout)?;

        let mut stderr = Vec::new();
        channel.stderr().read_to_end(&mut stderr)?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        Ok(CommandResult {
            exit_code,
            stdout: Bytes::from(stdout),
            stderr: Bytes::from(stderr),
        })
    }
}

/// Run a command and return its result whatever the exit status
pub fn run<S: RemoteShell + ?Sized>(shell: &mut S, command: &str) -> Result<CommandResult, CommandError> {
    debug!("Running remote command: {}", command);

    let result = shell
        .exec(command)
        .map_err(|source| CommandError::TransportFailure {
            command: command.to_string(),
            source,
        })?;

    debug!("Command `{}` exited with {}", command, result.exit_code);
    Ok(result)
}

/// Run a command and return its stdout, treating a non-zero exit as an error
pub fn run_or_fail<S: RemoteShell + ?Sized>(shell: &mut S, command: &str) -> Result<String, CommandError> {
    let result = run(shell, command)?;

    if !result.success() {
        return Err(CommandError::NonZeroExit {
            command: command.to_string(),
            code: result.exit_code,
            stderr: result.stderr_lossy(),
        });
    }

    Ok(result.stdout_lossy())
}
