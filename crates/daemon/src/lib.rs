//! # dirshare Daemon Library
//!
//! This crate shares one directory tree over HTTP: browse it, download single
//! files, download whole directories as streamed ZIP archives, and upload
//! files into it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 HTTP front end (axum)                    │
//! │   auth · routes · error mapping · TLS · shutdown         │
//! ├──────────────────────────────────────────────────────────┤
//! │                    FileRepository                        │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────┐  │
//! │  │  Browser   │  │  Transfer  │  │ Archive streamer   │  │
//! │  └────────────┘  └────────────┘  └────────────────────┘  │
//! │             RelativePath / Root sandbox                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::files::{FileRepository, Root};
//!
//! fn main() -> anyhow::Result<()> {
//!     let repository = FileRepository::new(Root::new("/srv/share")?);
//!
//!     for entry in repository.list("docs")? {
//!         println!("{} {}", entry.name, entry.display_size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path sandbox, listing, transfers and archives
//! - [`http`]: Routes, authentication and the server loop

pub mod config;
pub mod files;
pub mod http;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export files types for convenience
pub use files::{
    ArchiveStream, ContentStream, DirectoryEntry, FileError, FileRepository, RelativePath, Root,
    UploadItem, UploadOutcome,
};

// Re-export http types for convenience
pub use http::{router, serve, ApiError, AppState};
