//! Facade over browsing, transfer and archiving for one shared root.

use std::fs;

use super::archive::{ArchiveStream, DirectoryArchiver};
use super::browser::{DirectoryBrowser, DirectoryEntry};
use super::error::FileError;
use super::path::{RelativePath, Root};
use super::transfer::{ContentStream, FileTransfer, UploadItem, UploadOutcome};

/// Every file operation the server exposes, addressed by root-relative
/// string paths.
///
/// All operations are synchronous and may block on filesystem I/O. Paths are
/// validated by [`RelativePath::parse`] first, so an escaping path fails with
/// [`FileError::InvalidPath`] before anything is touched.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: Root,
    browser: DirectoryBrowser,
    transfer: FileTransfer,
    archiver: DirectoryArchiver,
}

impl FileRepository {
    /// Create a repository over `root`.
    pub fn new(root: Root) -> Self {
        Self {
            browser: DirectoryBrowser::new(root.clone()),
            transfer: FileTransfer::new(root.clone()),
            archiver: DirectoryArchiver::new(root.clone()),
            root,
        }
    }

    /// Set the number of chunks buffered per archive stream.
    pub fn with_archive_capacity(mut self, capacity: usize) -> Self {
        self.archiver = self.archiver.with_capacity(capacity);
        self
    }

    /// The shared root.
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// List the immediate children of a directory.
    pub fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        self.browser.list_directory(&RelativePath::parse(path)?)
    }

    /// Metadata of a single entry.
    pub fn get_entry(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        self.browser.get_entry(&RelativePath::parse(path)?)
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: &str) -> Result<bool, FileError> {
        let resolved = self.root.resolve_str(path)?;
        match fs::symlink_metadata(resolved) {
            Ok(_) => Ok(true),
            Err(e) => match FileError::from_io(e, path) {
                err if err.is_not_found() => Ok(false),
                err => Err(err),
            },
        }
    }

    /// Whether `path` is a directory. A missing path is an error.
    pub fn is_directory(&self, path: &str) -> Result<bool, FileError> {
        let resolved = self.root.resolve_str(path)?;
        let metadata = fs::metadata(resolved).map_err(|e| FileError::from_io(e, path))?;
        Ok(metadata.is_dir())
    }

    /// Open a file for streaming.
    pub fn serve_file(&self, path: &str) -> Result<ContentStream, FileError> {
        self.transfer.serve_file(&RelativePath::parse(path)?)
    }

    /// Stream a directory as a ZIP archive.
    pub fn zip_directory(&self, path: &str) -> Result<ArchiveStream, FileError> {
        self.archiver.zip_directory(&RelativePath::parse(path)?)
    }

    /// Store a batch of uploads.
    pub fn upload<I>(&self, items: I) -> UploadOutcome
    where
        I: IntoIterator<Item = UploadItem>,
    {
        self.transfer.upload(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repository() -> (TempDir, FileRepository) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "0123456789").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        let repo = FileRepository::new(Root::new(temp_dir.path()).unwrap());
        (temp_dir, repo)
    }

    #[test]
    fn test_exists() {
        let (_temp_dir, repo) = repository();
        assert!(repo.exists("a.txt").unwrap());
        assert!(repo.exists("sub").unwrap());
        assert!(repo.exists("").unwrap());
        assert!(!repo.exists("missing.txt").unwrap());
    }

    #[test]
    fn test_is_directory() {
        let (_temp_dir, repo) = repository();
        assert!(repo.is_directory("sub").unwrap());
        assert!(!repo.is_directory("a.txt").unwrap());
        assert!(matches!(
            repo.is_directory("missing"),
            Err(FileError::NotFound(_))
        ));
    }

    #[test]
    fn test_every_operation_rejects_traversal() {
        let (_temp_dir, repo) = repository();
        let bad = "../outside";

        assert!(matches!(repo.list(bad), Err(FileError::InvalidPath { .. })));
        assert!(matches!(repo.exists(bad), Err(FileError::InvalidPath { .. })));
        assert!(matches!(
            repo.is_directory(bad),
            Err(FileError::InvalidPath { .. })
        ));
        assert!(matches!(
            repo.serve_file(bad),
            Err(FileError::InvalidPath { .. })
        ));
        assert!(matches!(
            repo.zip_directory(bad),
            Err(FileError::InvalidPath { .. })
        ));
        assert!(matches!(
            repo.get_entry(bad),
            Err(FileError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_every_operation_rejects_absolute_paths() {
        let (_temp_dir, repo) = repository();

        assert!(matches!(
            repo.list("/etc"),
            Err(FileError::InvalidPath { .. })
        ));
        assert!(matches!(
            repo.serve_file("/etc/passwd"),
            Err(FileError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_directory_and_file_operations_do_not_mix() {
        let (_temp_dir, repo) = repository();

        assert!(matches!(
            repo.serve_file("sub"),
            Err(FileError::IsADirectory(_))
        ));
        assert!(matches!(
            repo.zip_directory("a.txt"),
            Err(FileError::NotADirectory(_))
        ));
        assert!(matches!(repo.list("a.txt"), Err(FileError::NotADirectory(_))));
    }

    #[test]
    fn test_listing_reports_sizes() {
        let (_temp_dir, repo) = repository();

        let entries = repo.list("").unwrap();
        let file = entries.iter().find(|e| e.name == "a.txt").unwrap();
        assert_eq!(file.display_size, "10 B");
        let dir = entries.iter().find(|e| e.name == "sub").unwrap();
        assert_eq!(dir.display_size, "[Directory]");
    }
}
