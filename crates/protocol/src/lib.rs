//! # dirshare Protocol Library
//!
//! Wire types shared by the dirshare daemon and its HTTP clients.
//!
//! ## Overview
//!
//! The daemon answers every API request with JSON. This crate holds the
//! serde definitions of those bodies so that clients and tests can decode
//! them without depending on the daemon itself:
//!
//! - **Listing**: [`FileListResponse`] and [`FileEntry`]
//! - **Upload**: [`UploadResponse`] with per-file successes and failures
//! - **Errors**: [`ErrorMessage`] carrying a stable [`ErrorCode`]
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ErrorCode, ErrorMessage};
//!
//! let body = ErrorMessage::new(ErrorCode::NotFound, "path does not exist: a.txt");
//! let json = serde_json::to_string(&body).unwrap();
//! assert!(json.contains("not_found"));
//! ```

pub mod messages;

pub use messages::{
    ErrorCode, ErrorMessage, FileEntry, FileEntryType, FileListResponse, UploadFailure,
    UploadResponse, UploadedFile, API_VERSION,
};
