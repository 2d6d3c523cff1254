//! Wire message definitions for the dirshare HTTP API.
//!
//! Every response body produced by the daemon is one of the types below,
//! serialized as JSON. Sizes are always reported as true byte counts; the
//! human-readable `display_size` is provided alongside for simple clients.

use serde::{Deserialize, Serialize};

/// Current API version, reported by listing responses.
pub const API_VERSION: u8 = 1;

// ============================================================================
// Listing
// ============================================================================

/// Response with directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    /// API version for compatibility checking.
    pub version: u8,
    /// Root-relative path that was listed ("/" for the shared root).
    pub path: String,
    /// Entries in operating-system order.
    pub entries: Vec<FileEntry>,
}

impl FileListResponse {
    /// Create a listing response with the current API version.
    pub fn new(path: impl Into<String>, entries: Vec<FileEntry>) -> Self {
        Self {
            version: API_VERSION,
            path: path.into(),
            entries,
        }
    }
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub entry_type: FileEntryType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Formatted size, or `[Directory]` for directories.
    pub display_size: String,
    /// Browse URL of the entry.
    pub url: String,
    /// URL that streams the entry as a ZIP archive.
    pub zip_url: String,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Permission bits.
    #[serde(default)]
    pub mode: u32,
}

/// Type of file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Anything else the filesystem reports (symlink, socket, device).
    Other,
}

// ============================================================================
// Upload
// ============================================================================

/// Result of a multipart upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UploadResponse {
    /// Files written successfully.
    pub uploaded: Vec<UploadedFile>,
    /// Files that could not be written.
    pub failed: Vec<UploadFailure>,
    /// Parts discarded because they carried no file name.
    pub skipped: usize,
}

/// A file written by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Root-relative destination path.
    pub name: String,
    /// Bytes written.
    pub size: u64,
}

/// A file an upload failed to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    /// Declared destination name.
    pub name: String,
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable reason.
    pub message: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Optional context (e.g. the offending path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ErrorMessage {
    /// Create an error body without context.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Attach context to the error body.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The path was rejected before touching the filesystem.
    InvalidPath,
    /// Resource not found.
    NotFound,
    /// A directory was required.
    NotADirectory,
    /// A file was required.
    IsADirectory,
    /// Authentication failure.
    Unauthorized,
    /// Invalid request or parameters.
    InvalidRequest,
    /// Server-side error.
    InternalError,
}

impl ErrorCode {
    /// Stable string form, matching the JSON representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidPath => "invalid_path",
            ErrorCode::NotFound => "not_found",
            ErrorCode::NotADirectory => "not_a_directory",
            ErrorCode::IsADirectory => "is_a_directory",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InternalError => "internal_error",
        }
    }
}
