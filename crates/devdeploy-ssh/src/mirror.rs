//! Mirroring local artifact trees onto the remote host

use crate::materialize::ensure_directory;
use crate::{FileError, RemoteFs, RemotePath, FILE_MODE};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Chunk size for streamed file copies
pub const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Totals for one mirroring run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Files copied
    pub files: usize,
    /// Bytes written to the remote host
    pub bytes: u64,
    /// Patterns that matched nothing
    pub unmatched: Vec<String>,
}

/// Copies glob-selected local files and directories under a remote root
///
/// Patterns are resolved against `base_dir`, never the process working
/// directory. A matched file lands directly in the remote root; a matched
/// directory is reproduced below a remote directory of the same name.
pub struct Mirror<'a, F: RemoteFs + ?Sized> {
    fs: &'a F,
    base_dir: PathBuf,
    buffer_size: usize,
    ensured: HashSet<RemotePath>,
    summary: TransferSummary,
}

impl<'a, F: RemoteFs + ?Sized> Mirror<'a, F> {
    /// Create a mirror writing through `fs`
    pub fn new(fs: &'a F, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base_dir: base_dir.into(),
            buffer_size: COPY_BUFFER_SIZE,
            ensured: HashSet::new(),
            summary: TransferSummary::default(),
        }
    }

    /// Override the copy chunk size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Copy everything matched by `patterns` under `remote_root`
    pub fn send(mut self, patterns: &[String], remote_root: &RemotePath) -> Result<TransferSummary, FileError> {
        for pattern in patterns {
            let matches = self.expand(pattern)?;
            if matches.is_empty() {
                warn!("No files match {}", pattern);
                self.summary.unmatched.push(pattern.clone());
                continue;
            }

            for path in matches {
                info!("\tCopying {}", self.display_name(&path));
                let metadata = fs::metadata(&path).map_err(|e| FileError::local(&path, e))?;
                if metadata.is_dir() {
                    self.send_directory(&path, remote_root)?;
                } else {
                    self.send_file(&path, remote_root)?;
                }
            }
        }

        Ok(self.summary)
    }

    /// Expand one pattern relative to the base directory
    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>, FileError> {
        let pattern = pattern.trim_end_matches(['/', '\\']);
        let base = glob::Pattern::escape(&self.base_dir.to_string_lossy());
        let full = format!("{}/{}", base.trim_end_matches(['/', '\\']), pattern);

        let entries = glob::glob(&full).map_err(|e| {
            FileError::local(
                PathBuf::from(&full),
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            )
        })?;

        entries
            .map(|entry| {
                entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    FileError::local(path, e.into())
                })
            })
            .collect()
    }

    fn send_file(&mut self, local: &Path, remote_dir: &RemotePath) -> Result<(), FileError> {
        let bytes = copy_file(self.fs, local, remote_dir, self.buffer_size)?;
        self.summary.files += 1;
        self.summary.bytes += bytes;
        Ok(())
    }

    fn send_directory(&mut self, local_dir: &Path, remote_root: &RemotePath) -> Result<(), FileError> {
        let name = local_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote_dir = remote_root.join(&name);

        for entry in WalkDir::new(local_dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| local_dir.to_path_buf());
                FileError::local(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative_parent = entry
                .path()
                .strip_prefix(local_dir)
                .ok()
                .and_then(Path::parent)
                .map(remote_relative)
                .unwrap_or_default();
            let target_dir = remote_dir.join(relative_parent);

            if !self.ensured.contains(&target_dir) {
                ensure_directory(self.fs, &target_dir)?;
                self.ensured.insert(target_dir.clone());
            }

            self.send_file(entry.path(), &target_dir)?;
        }

        Ok(())
    }

    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.base_dir)
            .map(remote_relative)
            .unwrap_or_else(|_| path.display().to_string())
    }
}

/// Join local path components with `/`
fn remote_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy everything matched by `patterns` (relative to `base_dir`) under `remote_root`
pub fn send<F: RemoteFs + ?Sized>(
    fs: &F,
    base_dir: &Path,
    patterns: &[String],
    remote_root: &RemotePath,
) -> Result<TransferSummary, FileError> {
    Mirror::new(fs, base_dir).send(patterns, remote_root)
}

/// Stream one local file into `remote_dir`, keeping its file name
///
/// The file is read and written in chunks of `buffer_size`, so memory use
/// does not depend on the file size. Returns the number of bytes copied.
pub fn copy_file<F: RemoteFs + ?Sized>(
    fs: &F,
    local: &Path,
    remote_dir: &RemotePath,
    buffer_size: usize,
) -> Result<u64, FileError> {
    let name = local.file_name().ok_or_else(|| {
        FileError::local(local, io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
    })?;
    let remote_path = remote_dir.join(name.to_string_lossy());

    let mut source = File::open(local).map_err(|e| FileError::local(local, e))?;
    let mut target = fs
        .create(&remote_path, FILE_MODE)
        .map_err(|e| FileError::remote(&remote_path, e))?;

    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FileError::local(local, e)),
        };
        target
            .write_all(&buffer[..read])
            .map_err(|e| FileError::remote(&remote_path, e))?;
        copied += read as u64;
    }
    target.flush().map_err(|e| FileError::remote(&remote_path, e))?;

    debug!("Copied {} ({} bytes) to {}", local.display(), copied, remote_path);
    Ok(copied)
}

#[cfg(test)]
mod tests;
