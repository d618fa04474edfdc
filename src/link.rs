//! Share-link parsing.
//!
//! Recognised shapes (current and legacy):
//! - `https://mega.nz/file/{id}#{key}` and `https://mega.nz/#!{id}!{key}`
//! - `https://mega.nz/folder/{id}#{key}`, `https://mega.nz/#F!{id}!{key}` and
//!   `https://mega.nz/#!F!{id}!{key}`
//!
//! Folder links may continue with `/folder/{id}` segments that point at a
//! nested folder; the last one scopes the listing.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::keys::KeyMaterial;

static MODERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:www\.)?mega\.(?:nz|co\.nz)/(file|folder)/([A-Za-z0-9_-]{8})#([A-Za-z0-9_-]{16,})",
    )
    .expect("valid regex")
});

static LEGACY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?mega\.(?:nz|co\.nz)/#!?(F?)!([A-Za-z0-9_-]{8})!([A-Za-z0-9_-]{16,})")
        .expect("valid regex")
});

static FOLDER_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folder/([A-Za-z0-9_-]{8})").expect("valid regex"));

/// A single-file share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    /// Public node id.
    pub id: String,
    /// Raw file key (normally eight words).
    pub key: KeyMaterial,
}

/// A folder share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLink {
    /// Id of the shared root folder.
    pub id: String,
    /// Shared folder key, already folded to four words when it was longer.
    pub key: KeyMaterial,
    /// Nested folder the link points into, if any.
    pub target: Option<String>,
}

impl FolderLink {
    /// Returns the 128-bit key that unwraps every node key in the listing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the key does not have a usable word
    /// count.
    pub fn shared_key(&self) -> Result<[u8; 16]> {
        Ok(self.key.derive()?.key)
    }
}

/// Either kind of share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Link to one file.
    File(FileLink),
    /// Link to a folder tree.
    Folder(FolderLink),
}

/// Kind recognised by the path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    File,
    Folder,
}

struct RawLink<'a> {
    kind: LinkKind,
    id: &'a str,
    key: &'a str,
}

/// Converts a legacy link to the current format.
///
/// - `https://mega.nz/#F!{id}!{key}` and `https://mega.nz/#!F!{id}!{key}`
///   → `https://mega.nz/folder/{id}#{key}`
/// - `https://mega.nz/#!{id}!{key}`  → `https://mega.nz/file/{id}#{key}`
///
/// Anything else is returned unchanged.
#[must_use]
pub fn normalize_link(url: &str) -> String {
    let trimmed = url.trim();
    LEGACY_RE.captures(trimmed).map_or_else(
        || trimmed.to_string(),
        |caps| {
            let kind = if &caps[1] == "F" { "folder" } else { "file" };
            let rest = &trimmed[caps.get(0).map_or(0, |m| m.end())..];
            format!("https://mega.nz/{kind}/{}#{}{rest}", &caps[2], &caps[3])
        },
    )
}

/// Returns `true` if the URL names a folder rather than a single file.
#[must_use]
pub fn is_folder_link(url: &str) -> bool {
    url.contains("/folder/") || url.contains("#F!") || url.contains("#!F!")
}

fn split(url: &str) -> Result<RawLink<'_>> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::Validation(format!("not an http(s) URL: {url}")));
    }
    let caps = MODERN_RE
        .captures(url)
        .ok_or_else(|| Error::Validation(format!("unrecognised share link: {url}")))?;
    let kind = if caps.get(1).map(|m| m.as_str()) == Some("folder") {
        LinkKind::Folder
    } else {
        LinkKind::File
    };
    let id = caps.get(2).map_or("", |m| m.as_str());
    let key = caps.get(3).map_or("", |m| m.as_str());
    Ok(RawLink { kind, id, key })
}

/// Parses a single-file link.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the URL is not a file link for the
/// service or the key blob does not decode.
pub fn parse_file_link(url: &str) -> Result<FileLink> {
    let normalized = normalize_link(url);
    let raw = split(&normalized)?;
    if raw.kind != LinkKind::File {
        return Err(Error::Validation(format!("not a file link: {url}")));
    }
    Ok(FileLink {
        id: raw.id.to_string(),
        key: KeyMaterial::from_base64(raw.key)?,
    })
}

/// Parses a folder link, including an optional nested target folder.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the URL is not a folder link for the
/// service or the key blob does not decode.
pub fn parse_folder_link(url: &str) -> Result<FolderLink> {
    let normalized = normalize_link(url);
    let raw = split(&normalized)?;
    if raw.kind != LinkKind::Folder {
        return Err(Error::Validation(format!("not a folder link: {url}")));
    }
    let ids: Vec<&str> = FOLDER_SEGMENT_RE
        .captures_iter(&normalized)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let target = if ids.len() > 1 {
        ids.last().map(|id| (*id).to_string())
    } else {
        None
    };
    Ok(FolderLink {
        id: raw.id.to_string(),
        key: KeyMaterial::from_base64(raw.key)?.fold(),
        target,
    })
}

/// Parses either kind of link.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the URL matches neither shape.
pub fn parse_link(url: &str) -> Result<Link> {
    if is_folder_link(url) {
        parse_folder_link(url).map(Link::Folder)
    } else {
        parse_file_link(url).map(Link::File)
    }
}
