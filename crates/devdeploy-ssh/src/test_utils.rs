//! In-memory stand-ins for a remote host
//!
//! [`MemoryFs`] behaves like an SFTP server's file system (single-level
//! `mkdir`, parents must exist) and [`MockHost`] pairs it with a shell that
//! understands the handful of administrative commands a deployment issues.

use crate::{CommandResult, FileError, RemoteFs, RemoteHost, RemotePath, RemoteShell};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Debug, Default)]
struct FsState {
    dirs: BTreeSet<RemotePath>,
    files: BTreeMap<RemotePath, Vec<u8>>,
    denied: BTreeSet<RemotePath>,
    failing_writes: BTreeSet<RemotePath>,
    hidden_once: BTreeSet<RemotePath>,
    write_calls: HashMap<RemotePath, usize>,
    mkdir_attempts: usize,
}

/// Shared in-memory remote file system
///
/// Clones share the same state, so a test can keep a handle while the code
/// under test owns another.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Rc<RefCell<FsState>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Empty file system containing only `/`
    pub fn new() -> Self {
        let mut state = FsState::default();
        state.dirs.insert(RemotePath::root());
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Create a directory and all of its ancestors
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.borrow_mut();
        let mut current = RemotePath::new(path);
        loop {
            state.dirs.insert(current.clone());
            let parent = current.parent();
            if parent == current {
                break;
            }
            current = parent;
        }
    }

    /// Place a file, creating its directory
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let path = RemotePath::new(path);
        self.add_dir(path.parent().as_str());
        self.state.borrow_mut().files.insert(path, contents.to_vec());
    }

    /// Make `mkdir` and file creation at exactly `path` fail
    pub fn deny(&self, path: &str) {
        self.state.borrow_mut().denied.insert(RemotePath::new(path));
    }

    /// Make writes to the file at `path` fail after it is opened
    pub fn fail_writes(&self, path: &str) {
        self.state.borrow_mut().failing_writes.insert(RemotePath::new(path));
    }

    /// Report `path` as missing on the next `is_dir` query only
    pub fn hide_dir_once(&self, path: &str) {
        self.state.borrow_mut().hidden_once.insert(RemotePath::new(path));
    }

    /// Contents of a file, if present
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(&RemotePath::new(path)).cloned()
    }

    /// All file paths, sorted
    pub fn file_paths(&self) -> Vec<String> {
        self.state.borrow().files.keys().map(|p| p.to_string()).collect()
    }

    /// Number of `write` calls made on the file at `path`
    pub fn write_calls(&self, path: &str) -> usize {
        self.state
            .borrow()
            .write_calls
            .get(&RemotePath::new(path))
            .copied()
            .unwrap_or(0)
    }

    /// Total `mkdir` calls, successful or not
    pub fn mkdir_attempts(&self) -> usize {
        self.state.borrow().mkdir_attempts
    }

    /// Remove everything below `path`, keeping `path` itself
    pub fn clear_contents(&self, path: &str) {
        let root = RemotePath::new(path);
        let prefix = format!("{}/", root.as_str().trim_end_matches('/'));
        let mut state = self.state.borrow_mut();
        state.dirs.retain(|d| !d.as_str().starts_with(&prefix));
        state.files.retain(|f, _| !f.as_str().starts_with(&prefix));
    }

    fn append(&self, path: &RemotePath, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_writes.contains(path) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write rejected"));
        }
        *state.write_calls.entry(path.clone()).or_insert(0) += 1;
        state
            .files
            .get_mut(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file handle closed"))?
            .extend_from_slice(data);
        Ok(())
    }
}

impl RemoteFs for MemoryFs {
    fn is_dir(&self, path: &RemotePath) -> bool {
        let mut state = self.state.borrow_mut();
        if state.hidden_once.remove(path) {
            return false;
        }
        state.dirs.contains(path)
    }

    fn mkdir(&self, path: &RemotePath, _mode: i32) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.mkdir_attempts += 1;

        if path.as_str().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty path"));
        }
        if state.denied.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
        }
        if state.dirs.contains(path) || state.files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already exists"));
        }
        if !state.dirs.contains(&path.parent()) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }

        state.dirs.insert(path.clone());
        Ok(())
    }

    fn create(&self, path: &RemotePath, _mode: i32) -> io::Result<Box<dyn Write + '_>> {
        let mut state = self.state.borrow_mut();
        if state.denied.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
        }
        if state.dirs.contains(path) {
            return Err(io::Error::new(io::ErrorKind::Other, "is a directory"));
        }
        if !state.dirs.contains(&path.parent()) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }

        state.files.insert(path.clone(), Vec::new());
        Ok(Box::new(MemoryFile {
            fs: self,
            path: path.clone(),
        }))
    }
}

struct MemoryFile<'a> {
    fs: &'a MemoryFs,
    path: RemotePath,
}

impl Write for MemoryFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.fs.append(&self.path, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How a scripted command should fail
#[derive(Debug, Clone)]
pub enum CommandFailure {
    /// The channel breaks before a result is produced
    Transport,
    /// The command runs and exits with this status and stderr
    Exit(i32, String),
}

/// Remote host simulation for orchestrator tests
///
/// Understands `hostname`, `mount -o rw|ro,remount`, `mkdir -p`, `rm -rf
/// <dir>/*`, `chmod +x` and `sed -i`, each with single-quoted paths as the
/// deployment issues them. Anything else succeeds with empty output.
#[derive(Debug, Clone)]
pub struct MockHost {
    fs: MemoryFs,
    hostname: String,
    history: Vec<String>,
    failures: Vec<(String, CommandFailure)>,
    sftp_available: bool,
    writable: bool,
    executable: BTreeSet<String>,
    line_endings_fixed: BTreeSet<String>,
}

impl MockHost {
    /// Host with a read-only root and the given file system
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            hostname: "robot".to_string(),
            history: Vec::new(),
            failures: Vec::new(),
            sftp_available: true,
            writable: false,
            executable: BTreeSet::new(),
            line_endings_fixed: BTreeSet::new(),
        }
    }

    /// Fail every command that starts with `prefix`
    pub fn fail_command(mut self, prefix: &str, failure: CommandFailure) -> Self {
        self.failures.push((prefix.to_string(), failure));
        self
    }

    /// Make `open_fs` fail
    pub fn without_sftp(mut self) -> Self {
        self.sftp_available = false;
        self
    }

    /// File system handle shared with the host
    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }

    /// Commands run so far, in order
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Whether the root file system is currently mounted read-write
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Whether `chmod +x` was applied to `path`
    pub fn is_executable(&self, path: &str) -> bool {
        self.executable.contains(path)
    }

    /// Whether `sed -i` line-ending cleanup was applied to `path`
    pub fn line_endings_fixed(&self, path: &str) -> bool {
        self.line_endings_fixed.contains(path)
    }

    fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            exit_code: 0,
            stdout: Bytes::copy_from_slice(stdout.as_bytes()),
            stderr: Bytes::new(),
        }
    }

    fn failed(code: i32, stderr: &str) -> CommandResult {
        CommandResult {
            exit_code: code,
            stdout: Bytes::new(),
            stderr: Bytes::copy_from_slice(stderr.as_bytes()),
        }
    }

    fn simulate(&mut self, command: &str) -> CommandResult {
        let quoted = quoted_args(command);

        if command == "hostname" {
            return Self::ok(&format!("{}\n", self.hostname));
        }
        if command.contains("mount -o rw,remount") {
            self.writable = true;
            return Self::ok("");
        }
        if command.contains("mount -o ro,remount") {
            self.writable = false;
            return Self::ok("");
        }
        if command.starts_with("mkdir -p") {
            if !self.writable {
                return Self::failed(1, "mkdir: Read-only file system\n");
            }
            for dir in &quoted {
                self.fs.add_dir(dir);
            }
            if command.contains("rm -rf") {
                if let Some(dir) = quoted.first() {
                    self.fs.clear_contents(dir);
                }
            }
            return Self::ok("");
        }
        if command.starts_with("chmod +x") {
            for path in quoted {
                if self.fs.file(&path).is_none() {
                    return Self::failed(1, &format!("chmod: cannot access '{}'\n", path));
                }
                self.executable.insert(path);
            }
            return Self::ok("");
        }
        if command.starts_with("sed -i") {
            // The first quoted argument is the sed expression.
            for path in quoted.into_iter().skip(1) {
                if self.fs.file(&path).is_none() {
                    return Self::failed(2, &format!("sed: can't read {}\n", path));
                }
                self.line_endings_fixed.insert(path);
            }
            return Self::ok("");
        }

        Self::ok("")
    }
}

/// Extract single-quoted arguments, undoing `'\''` escapes
fn quoted_args(command: &str) -> Vec<String> {
    let unescaped = command.replace(r"'\''", "\u{0}");
    unescaped
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(|arg| arg.replace('\u{0}', "'"))
        .collect()
}

impl RemoteShell for MockHost {
    fn exec(&mut self, command: &str) -> io::Result<CommandResult> {
        self.history.push(command.to_string());

        let failure = self
            .failures
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, failure)| failure.clone());

        match failure {
            Some(CommandFailure::Transport) => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "channel closed"))
            }
            Some(CommandFailure::Exit(code, stderr)) => Ok(Self::failed(code, &stderr)),
            None => Ok(self.simulate(command)),
        }
    }
}

impl RemoteHost for MockHost {
    type Fs = MemoryFs;

    fn open_fs(&mut self) -> Result<MemoryFs, FileError> {
        if !self.sftp_available {
            return Err(FileError::SftpUnavailable {
                source: ssh2::Error::new(ssh2::ErrorCode::Session(-31), "subsystem request denied"),
            });
        }
        Ok(self.fs.clone())
    }
}
