//! megalink - A library for downloading files and folders from MEGA share links.
//!
//! Share links carry their decryption key in the URL fragment. This library
//! parses those links, decrypts folder listings and file names, and streams
//! file bodies through AES-CTR to disk while reporting progress. No account
//! or login is involved.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use megalink::{DownloadConfig, Downloader, LineProgress};
//!
//! # async fn example() -> megalink::Result<()> {
//! let downloader = Downloader::new(DownloadConfig::default())?;
//!
//! // Print one status line per progress event
//! let progress = LineProgress(|line: &str| println!("{line}"));
//!
//! let done = downloader
//!     .download("https://mega.nz/folder/AbCd1234#ZmFrZWtleWZha2VrZXkxMg", Path::new("out"), &progress)
//!     .await?;
//! println!("Downloaded {} files", done.stats.files_downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod attrs;
pub mod base64;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod keys;
pub mod link;
pub mod progress;
pub mod stats;
pub mod task;
pub mod tree;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use api::{ApiClient, FileInfo};
pub use attrs::{Attributes, decrypt_attributes};
pub use config::{AppConfig, DownloadConfig};
pub use download::{DownloadTarget, Downloaded, Downloader, FolderListing, decrypt_stream};
pub use error::{Error, ErrorKind, Result};
pub use format::{format_bytes, format_duration, format_line};
pub use fs::{FileSystem, TokioFileSystem};
pub use keys::{DerivedKey, KeyMaterial};
pub use link::{FileLink, FolderLink, Link, is_folder_link, parse_link};
pub use progress::{DownloadProgress, LineProgress, NoProgress, ProgressEvent, Stage, TransferMeter};
pub use stats::{FileStats, SessionStats, SessionStatsBuilder};
pub use task::{RetryPolicy, spawn_delayed};
pub use tree::{Node, NodeKind, ResolvedFile, resolve};
