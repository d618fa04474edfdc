//! Core download logic.
//!
//! A download is: parse the link, ask the metadata API for a media URL, then
//! stream the body through one AES-CTR keystream into the destination file.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::api::ApiClient;
use crate::attrs::decrypt_attributes;
use crate::config::DownloadConfig;
use crate::crypto::FileCipher;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::keys::DerivedKey;
use crate::link::{FolderLink, is_folder_link, parse_file_link, parse_folder_link};
use crate::progress::{DownloadProgress, TransferMeter};
use crate::stats::{FileStats, SessionStats, SessionStatsBuilder};
use crate::tree::{ResolvedFile, resolve, sanitize_component};

/// Classification of a file's current state on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// File exists with the expected size.
    Complete,
    /// Anything else. The file will be (re)written from the start.
    Missing,
}

/// Everything needed to fetch one file. Built right before streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Direct media URL.
    pub url: String,
    /// Declared size in bytes; zero means unknown.
    pub size: u64,
    /// Cipher key and nonce.
    pub key: DerivedKey,
    /// Destination file.
    pub path: PathBuf,
}

/// A resolved folder link.
#[derive(Debug, Clone)]
pub struct FolderListing {
    /// The parsed link.
    pub link: FolderLink,
    /// Eligible files, in listing order.
    pub files: Vec<ResolvedFile>,
}

/// Outcome of a successful download call.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Files written (or found complete and skipped), in order.
    pub paths: Vec<PathBuf>,
    /// Counters for the call.
    pub stats: SessionStats,
}

/// Core downloader for share links.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    api: ApiClient,
    http: reqwest::Client,
    config: DownloadConfig,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if an HTTP client cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        Self::with_fs(config, TokioFileSystem)
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if an HTTP client cannot be built.
    pub fn with_fs(config: DownloadConfig, fs: F) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()?;
        Ok(Self {
            api,
            http,
            config,
            fs,
        })
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the metadata API client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Downloads a file or folder link into `dest_dir`.
    ///
    /// # Errors
    ///
    /// See [`Downloader::download_file`] and [`Downloader::download_folder`].
    pub async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<Downloaded> {
        if is_folder_link(url) {
            self.download_folder(url, dest_dir, progress).await
        } else {
            self.download_file(url, dest_dir, progress).await
        }
    }

    /// Downloads a single-file link into `dest_dir`, named after the file's
    /// decrypted name (or its id when the name is unreadable).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed link, before any
    /// request is made. Network, API and I/O failures are returned as they
    /// occur; a partially written file is left in place.
    pub async fn download_file(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<Downloaded> {
        let link = parse_file_link(url)?;
        let key = link.key.derive()?;
        let mut builder = SessionStatsBuilder::new();

        let info = self.api.file_info(&link.id).await?;
        let name = info
            .attributes
            .as_deref()
            .map(|blob| decrypt_attributes(blob, &key.key))
            .and_then(|attrs| attrs.name().map(str::to_string))
            .unwrap_or_else(|| {
                log::warn!("file {} has no readable name; using its id", link.id);
                link.id.clone()
            });
        let name = sanitize_component(&name, &link.id);
        let path = dest_dir.join(&name);

        if self.classify_file(&path, info.size).await == FileStatus::Complete {
            log::info!("{} already complete; skipping", path.display());
            builder.add_skipped();
            return Ok(Downloaded {
                paths: vec![path],
                stats: builder.build(),
            });
        }

        let target = DownloadTarget {
            url: info.url,
            size: info.size,
            key,
            path,
        };
        let meter = TransferMeter::new(progress, name, Some(info.size), self.config.progress_interval());
        let stats = self.fetch(&target, meter).await?;
        builder.add_download(&stats);

        Ok(Downloaded {
            paths: vec![target.path],
            stats: builder.build(),
        })
    }

    /// Downloads every file of a folder link into `dest_dir`, recreating the
    /// folder structure. Files are fetched one at a time in listing order.
    ///
    /// A file whose metadata lacks a URL or size is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed link, before any
    /// request is made. The first network, API or I/O failure aborts the
    /// batch.
    pub async fn download_folder(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<Downloaded> {
        let listing = self.resolve_folder(url).await?;
        let count = listing.files.len();
        log::info!("folder {}: {count} file(s) to fetch", listing.link.id);

        let mut builder = SessionStatsBuilder::new();
        let mut paths = Vec::with_capacity(count);

        for (index, file) in listing.files.iter().enumerate() {
            let path = dest_dir.join(&file.path);
            if let Some(size) = file.size {
                if self.classify_file(&path, size).await == FileStatus::Complete {
                    log::info!("{} already complete; skipping", path.display());
                    builder.add_skipped();
                    paths.push(path);
                    continue;
                }
            }

            let info = match self.api.folder_file_info(&listing.link.id, &file.id).await {
                Ok(info) => info,
                Err(Error::Validation(msg)) => {
                    log::warn!("skipping {}: {msg}", file.path.display());
                    builder.add_skipped();
                    continue;
                }
                Err(e) => return Err(e),
            };

            let target = DownloadTarget {
                url: info.url,
                size: info.size,
                key: file.key.derive()?,
                path,
            };
            let meter = TransferMeter::new(
                progress,
                file.path.display().to_string(),
                Some(info.size),
                self.config.progress_interval(),
            )
            .with_item(index + 1, count);
            let stats = self.fetch(&target, meter).await?;
            builder.add_download(&stats);
            paths.push(target.path);
        }

        Ok(Downloaded {
            paths,
            stats: builder.build(),
        })
    }

    /// Lists and resolves a folder link without downloading anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed link or listing, and
    /// network or API errors from the listing request.
    pub async fn resolve_folder(&self, url: &str) -> Result<FolderListing> {
        let link = parse_folder_link(url)?;
        let shared_key = link.shared_key()?;
        let nodes = self.api.list_folder(&link.id).await?;
        let files = resolve(&nodes, &shared_key, link.target.as_deref());
        log::debug!(
            "folder {}: {} nodes, {} eligible files",
            link.id,
            nodes.len(),
            files.len()
        );
        Ok(FolderListing { link, files })
    }

    /// Classifies a file's current status on disk.
    async fn classify_file(&self, path: &Path, expected_size: u64) -> FileStatus {
        if !self.config.skip_existing {
            return FileStatus::Missing;
        }
        if self
            .fs
            .file_size(path)
            .await
            .is_some_and(|size| size == expected_size)
        {
            FileStatus::Complete
        } else {
            FileStatus::Missing
        }
    }

    /// Ensures the parent directory exists for a file path.
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Streams one target to disk, reporting through `meter`.
    ///
    /// Emits `starting` before the request, then either `done` or a single
    /// `error` event.
    async fn fetch(&self, target: &DownloadTarget, mut meter: TransferMeter<'_>) -> Result<FileStats> {
        meter.start();
        let result = self.fetch_inner(target, &mut meter).await;
        match result {
            Ok(()) => Ok(meter.finish()),
            Err(e) => {
                log::error!("download of {} failed: {e}", target.path.display());
                meter.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch_inner(&self, target: &DownloadTarget, meter: &mut TransferMeter<'_>) -> Result<()> {
        let response = self
            .http
            .get(&target.url)
            .send()
            .await?
            .error_for_status()?;

        self.ensure_parent_dir(&target.path).await?;
        let file = self.fs.create_file(&target.path).await?;
        let mut writer = BufWriter::with_capacity(self.config.write_buffer.max(1), file);

        let written = decrypt_stream(response.bytes_stream(), &target.key, &mut writer, meter).await?;
        if target.size > 0 && written != target.size {
            log::warn!(
                "{}: expected {} bytes, received {written}",
                target.path.display(),
                target.size
            );
        }
        Ok(())
    }
}

/// Decrypts a ciphertext byte stream into `writer`.
///
/// One keystream covers the whole stream, so the output does not depend on
/// how the input is split into chunks. Every chunk is reported to `meter`.
/// Returns the number of bytes written; `writer` is flushed on success.
///
/// # Errors
///
/// Returns the stream's error (converted) or a write error. Bytes written
/// before the failure stay written.
pub async fn decrypt_stream<S, E, W>(
    body: S,
    key: &DerivedKey,
    writer: &mut W,
    meter: &mut TransferMeter<'_>,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
    W: AsyncWrite + Unpin,
{
    let mut body = std::pin::pin!(body);
    let mut cipher = FileCipher::new(key);
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let mut buf = chunk.map_err(Into::<Error>::into)?.to_vec();
        cipher.apply(&mut buf);
        writer.write_all(&buf).await?;
        let len = buf.len() as u64;
        written += len;
        meter.advance(len);
    }
    writer.flush().await?;
    Ok(written)
}
