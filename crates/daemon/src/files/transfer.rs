//! File downloads and uploads below the shared root.
//!
//! Downloads hand the caller an open [`ContentStream`]; nothing is read ahead.
//! Uploads are a batch of [`UploadItem`]s processed one by one, where a bad
//! item is recorded and skipped without affecting the rest of the batch.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};

use super::error::FileError;
use super::path::{RelativePath, Root};

/// An open file handed to the caller for sequential reading.
///
/// Dropping the stream closes the underlying handle.
#[derive(Debug)]
pub struct ContentStream {
    name: String,
    len: u64,
    file: File,
}

impl ContentStream {
    /// Suggested display name (final path component).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the file when it was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file was empty when it was opened.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Take the open file handle, e.g. to wrap it in an async reader.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Content to be stored under a caller-declared name.
///
/// The content is released exactly once, when the item is dropped by the
/// batch that consumed it.
pub struct UploadItem {
    /// Destination relative to the root. Empty names are discarded.
    pub name: String,
    /// Bytes to store.
    pub content: Box<dyn Read + Send>,
}

impl UploadItem {
    /// Pair a destination name with its content.
    pub fn new(name: impl Into<String>, content: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            content: Box::new(content),
        }
    }
}

impl fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadItem")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A file written by an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Root-relative destination, `/`-separated.
    pub name: String,
    /// Bytes written.
    pub size: u64,
}

/// An item an upload batch could not store.
#[derive(Debug)]
pub struct UploadFailure {
    /// Name the item declared.
    pub name: String,
    /// Why it failed.
    pub error: FileError,
}

/// Outcome of an upload batch.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    /// Items stored, in submission order.
    pub successes: Vec<UploadedFile>,
    /// Items that failed, in submission order.
    pub failures: Vec<UploadFailure>,
    /// Items discarded for having an empty name.
    pub skipped: usize,
}

impl UploadOutcome {
    /// The batch-level error: the first failure, reported only when nothing
    /// was stored.
    pub fn error(&self) -> Option<&FileError> {
        if self.successes.is_empty() {
            self.failures.first().map(|f| &f.error)
        } else {
            None
        }
    }

    /// Successes, or the batch-level error when nothing was stored.
    pub fn into_result(mut self) -> Result<Vec<UploadedFile>, FileError> {
        if self.successes.is_empty() && !self.failures.is_empty() {
            return Err(self.failures.swap_remove(0).error);
        }
        Ok(self.successes)
    }
}

/// File transfer handler anchored at the shared root.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    root: Root,
}

impl FileTransfer {
    /// Create a transfer handler for the given root.
    pub fn new(root: Root) -> Self {
        Self { root }
    }

    /// Open a regular file for sequential reading.
    ///
    /// Directories are refused with [`FileError::IsADirectory`]; they are
    /// served as archives instead.
    pub fn serve_file(&self, path: &RelativePath) -> Result<ContentStream, FileError> {
        let resolved = self.root.resolve(path);
        let rel = path.to_slash();

        let metadata = fs::metadata(&resolved).map_err(|e| FileError::from_io(e, &rel))?;
        if metadata.is_dir() {
            return Err(FileError::IsADirectory(path.to_url()));
        }

        let file = File::open(&resolved).map_err(|e| FileError::from_io(e, &rel))?;
        Ok(ContentStream {
            name: path.file_name().unwrap_or_default().to_string(),
            len: metadata.len(),
            file,
        })
    }

    /// Store every item, isolating failures per item.
    ///
    /// Items are pulled from `items` one at a time, so the batch may be fed
    /// lazily while earlier items are still being written.
    pub fn upload<I>(&self, items: I) -> UploadOutcome
    where
        I: IntoIterator<Item = UploadItem>,
    {
        let mut outcome = UploadOutcome::default();

        for UploadItem { name, mut content } in items {
            if name.is_empty() {
                outcome.skipped += 1;
                continue;
            }

            match self.store(&name, &mut content) {
                Ok(stored) => outcome.successes.push(stored),
                Err(error) => outcome.failures.push(UploadFailure { name, error }),
            }
        }

        outcome
    }

    fn store(&self, name: &str, content: &mut dyn Read) -> Result<UploadedFile, FileError> {
        let path = RelativePath::parse(name)?;
        if path.is_root() {
            return Err(FileError::invalid(name, "names no file"));
        }

        let destination = self.root.resolve(&path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        if destination.is_dir() {
            return Err(FileError::IsADirectory(path.to_url()));
        }

        let mut file = File::create(&destination)?;
        match io::copy(content, &mut file) {
            Ok(size) => Ok(UploadedFile {
                name: path.to_slash(),
                size,
            }),
            Err(e) => {
                drop(file);
                // Leave no truncated file behind; the item is reported failed.
                let _ = fs::remove_file(&destination);
                Err(FileError::Io(e))
            }
        }
    }
}
