//! POSIX-style paths on the remote host
//!
//! Remote paths are always `/`-separated regardless of the local platform, so
//! they are kept as normalised strings rather than [`std::path::PathBuf`].

use std::fmt;
use std::path::Path;

/// A normalised remote path
///
/// Normalisation converts `\` to `/`, drops empty and `.` segments and strips
/// trailing separators. An absolute path keeps its leading `/`; the root is
/// exactly `"/"` and the empty relative path is `""`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a normalised remote path
    pub fn new(path: impl AsRef<str>) -> Self {
        let raw = path.as_ref().replace('\\', "/");
        let segments: Vec<&str> = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let mut normalised = String::with_capacity(raw.len());
        if raw.starts_with('/') {
            normalised.push('/');
        }
        normalised.push_str(&segments.join("/"));
        Self(normalised)
    }

    /// The remote root directory
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Borrow the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View the path as a [`Path`] for APIs that take one
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Append a relative path
    pub fn join(&self, rest: impl AsRef<str>) -> Self {
        let rest = rest.as_ref();
        if self.0.is_empty() {
            return Self::new(rest);
        }
        Self::new(format!("{}/{}", self.0, rest))
    }

    /// Parent directory
    ///
    /// Taking the parent repeatedly always reaches a fixpoint: `/` for
    /// absolute paths and `""` for relative ones.
    pub fn parent(&self) -> Self {
        match self.0.rfind('/') {
            None => Self(String::new()),
            Some(0) => Self::root(),
            Some(idx) => Self(self.0[..idx].to_string()),
        }
    }

    /// Whether no further ascent is possible
    pub fn is_top(&self) -> bool {
        self.parent() == *self
    }

    /// Final path segment, if any
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Number of segments below the top
    pub fn depth(&self) -> usize {
        self.0.split('/').filter(|s| !s.is_empty()).count()
    }

    /// Single-quote the path for interpolation into a remote shell command
    pub fn shell_quoted(&self) -> String {
        format!("'{}'", self.0.replace('\'', r"'\''"))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
