//! Sandboxed file repository for the shared directory.
//!
//! This module provides every file operation the server performs:
//! - Path validation against the shared root
//! - Directory listing with display metadata
//! - Streaming single-file downloads
//! - Streaming ZIP archives of whole directories
//! - Batch uploads with per-item failure isolation
//!
//! # Security
//!
//! Caller-supplied paths are parsed into [`RelativePath`] values, which
//! reject absolute paths and `..` segments before any filesystem access.
//! Resolution is then a plain join onto the canonical [`Root`].
//!
//! Nothing in this module logs; failures are returned as [`FileError`].

pub mod archive;
pub mod browser;
pub mod error;
pub mod path;
pub mod pipe;
pub mod repository;
pub mod transfer;
pub mod zip_stream;

pub use archive::{ArchiveProducer, ArchiveStream, ArchiveSummary, DirectoryArchiver};
pub use browser::{format_size, DirectoryBrowser, DirectoryEntry, ARCHIVE_SUFFIX, DIRECTORY_MARKER};
pub use error::FileError;
pub use path::{RelativePath, Root};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use repository::FileRepository;
pub use transfer::{
    ContentStream, FileTransfer, UploadFailure, UploadItem, UploadOutcome, UploadedFile,
};
pub use zip_stream::ZipStreamWriter;
