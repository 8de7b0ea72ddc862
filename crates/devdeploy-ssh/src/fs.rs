//! Remote file system access over SFTP

use crate::{FileError, RemotePath, RemoteSession, RemoteShell};
use ssh2::{OpenFlags, OpenType, Sftp};
use std::io::{self, Write};

/// Mode for created directories: rwx for owner and group, r-x for others
pub const DIR_MODE: i32 = 0o775;

/// Mode for copied files: rw for owner and group, r for others
pub const FILE_MODE: i32 = 0o664;

/// File system operations the deployment needs on the remote host
pub trait RemoteFs {
    /// Whether `path` exists and can be opened as a directory
    fn is_dir(&self, path: &RemotePath) -> bool;

    /// Create a single directory; the parent must already exist
    fn mkdir(&self, path: &RemotePath, mode: i32) -> io::Result<()>;

    /// Create or truncate a file for writing
    fn create(&self, path: &RemotePath, mode: i32) -> io::Result<Box<dyn Write + '_>>;
}

/// A host that can both run commands and expose its file system
pub trait RemoteHost: RemoteShell {
    /// File system handle type
    type Fs: RemoteFs;

    /// Open the file system subsystem
    fn open_fs(&mut self) -> Result<Self::Fs, FileError>;
}

/// [`RemoteFs`] backed by a libssh2 SFTP channel
pub struct SftpFs {
    sftp: Sftp,
}

impl SftpFs {
    /// Wrap an open SFTP channel
    pub fn new(sftp: Sftp) -> Self {
        Self { sftp }
    }
}

impl RemoteFs for SftpFs {
    fn is_dir(&self, path: &RemotePath) -> bool {
        self.sftp.opendir(path.as_path()).is_ok()
    }

    fn mkdir(&self, path: &RemotePath, mode: i32) -> io::Result<()> {
        self.sftp.mkdir(path.as_path(), mode)?;
        Ok(())
    }

    fn create(&self, path: &RemotePath, mode: i32) -> io::Result<Box<dyn Write + '_>> {
        let file = self.sftp.open_mode(
            path.as_path(),
            OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE,
            mode,
            OpenType::File,
        )?;
        Ok(Box::new(file))
    }
}

impl RemoteHost for RemoteSession {
    type Fs = SftpFs;

    fn open_fs(&mut self) -> Result<SftpFs, FileError> {
        self.session()
            .sftp()
            .map(SftpFs::new)
            .map_err(|source| FileError::SftpUnavailable { source })
    }
}
