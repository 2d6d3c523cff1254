//! Resolution of caller-supplied paths against the shared root.
//!
//! Every path that reaches the repository from outside is a [`RelativePath`].
//! Parsing rejects anything that could climb out of the root before the
//! filesystem is ever touched, so [`Root::resolve`] is a plain join.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use super::error::FileError;

/// The trusted directory all resolution is anchored to.
///
/// Canonicalized once at construction and never mutated afterwards; clones
/// share the same path.
#[derive(Debug, Clone)]
pub struct Root {
    path: Arc<PathBuf>,
}

impl Root {
    /// Canonicalize `path` and verify that it is a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let canonical = fs::canonicalize(path).map_err(|e| FileError::from_io(e, &shown))?;
        let metadata = fs::metadata(&canonical).map_err(|e| FileError::from_io(e, &shown))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory(shown));
        }

        Ok(Self {
            path: Arc::new(canonical),
        })
    }

    /// Absolute path of the root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Join a validated relative path onto the root.
    pub fn resolve(&self, relative: &RelativePath) -> PathBuf {
        let mut resolved = self.path.as_ref().clone();
        for segment in &relative.segments {
            resolved.push(segment);
        }
        resolved
    }

    /// Parse `raw` and join it onto the root.
    pub fn resolve_str(&self, raw: &str) -> Result<PathBuf, FileError> {
        Ok(self.resolve(&RelativePath::parse(raw)?))
    }
}

/// A normalized path relative to the [`Root`].
///
/// Never contains a `..` segment, an empty segment or a `.` segment. The
/// empty path denotes the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Validate and normalize a caller-supplied path.
    ///
    /// Forward slashes always separate segments; the host separator does too
    /// on platforms where it differs. Fails with [`FileError::InvalidPath`]
    /// for absolute input, NUL bytes, or any literal `..` segment.
    pub fn parse(raw: &str) -> Result<Self, FileError> {
        if raw.contains('\0') {
            return Err(FileError::invalid(raw, "contains a NUL byte"));
        }

        let starts_at_root = raw.starts_with('/')
            || matches!(
                Path::new(raw).components().next(),
                Some(Component::RootDir | Component::Prefix(_))
            );
        if starts_at_root {
            return Err(FileError::invalid(raw, "absolute paths are not accepted"));
        }

        let mut segments = Vec::new();
        for segment in raw.split(|c: char| c == '/' || std::path::is_separator(c)) {
            match segment {
                "" | "." => {}
                ".." => return Err(FileError::invalid(raw, "parent directory segment")),
                name => {
                    if cfg!(windows) && name.contains(':') {
                        return Err(FileError::invalid(raw, "drive or stream separator"));
                    }
                    segments.push(name.to_string());
                }
            }
        }

        Ok(Self { segments })
    }

    /// Whether this path names the root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Child of this path. `name` must be a single entry name as returned by
    /// the filesystem.
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Segments joined with `/`, empty for the root.
    pub fn to_slash(&self) -> String {
        self.segments.join("/")
    }

    /// Browse URL of this path: `/` followed by the slash form.
    pub fn to_url(&self) -> String {
        format!("/{}", self.to_slash())
    }
}

impl FromStr for RelativePath {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}
