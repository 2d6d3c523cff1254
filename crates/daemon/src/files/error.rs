//! Error taxonomy shared by every file repository operation.

use std::io;

use thiserror::Error;

/// Errors that can occur while resolving, reading or writing shared files.
///
/// Paths carried by the variants are root-relative so that messages can be
/// shown to remote callers without revealing where the root lives.
#[derive(Debug, Error)]
pub enum FileError {
    /// The path was rejected before any filesystem access.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The requested path does not exist.
    #[error("path does not exist: {0}")]
    NotFound(String),

    /// A directory was required.
    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    /// A regular file was required.
    #[error("path is a directory: {0}")]
    IsADirectory(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    pub(crate) fn invalid(path: &str, reason: &'static str) -> Self {
        FileError::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }

    /// Map an IO error for `path`, singling out a missing entry.
    pub(crate) fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(display_path(path)),
            _ => FileError::Io(err),
        }
    }

    /// Whether this error means the path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileError::NotFound(_))
    }

    /// The root-relative path the error is about, if it names one.
    pub fn path(&self) -> Option<&str> {
        match self {
            FileError::InvalidPath { path, .. } => Some(path),
            FileError::NotFound(path)
            | FileError::NotADirectory(path)
            | FileError::IsADirectory(path) => Some(path),
            FileError::Io(_) => None,
        }
    }
}

/// Root-relative paths are displayed with a leading slash; the root is "/".
pub(crate) fn display_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FileError::invalid("../etc", "parent directory segment");
        assert_eq!(
            err.to_string(),
            "invalid path \"../etc\": parent directory segment"
        );

        let err = FileError::NotFound("/a.txt".to_string());
        assert_eq!(err.to_string(), "path does not exist: /a.txt");

        let err = FileError::IsADirectory("/sub".to_string());
        assert_eq!(err.to_string(), "path is a directory: /sub");
    }

    #[test]
    fn test_from_io_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = FileError::from_io(io_err, "docs/a.txt");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "path does not exist: /docs/a.txt");
    }

    #[test]
    fn test_from_io_other_kinds_stay_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = FileError::from_io(io_err, "secret");
        assert!(matches!(err, FileError::Io(_)));
    }

    #[test]
    fn test_error_path() {
        let err = FileError::invalid("../etc", "parent directory segment");
        assert_eq!(err.path(), Some("../etc"));
        assert_eq!(FileError::NotADirectory("/a".to_string()).path(), Some("/a"));

        let err = FileError::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(err.path(), None);
    }

    #[test]
    fn test_display_path_of_root() {
        assert_eq!(display_path(""), "/");
        assert_eq!(display_path("a/b"), "/a/b");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileError>();
    }
}
