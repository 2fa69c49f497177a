//! Filesystem backend wire types.

use serde::{Deserialize, Serialize};

/// Entry as returned by `/api/fs/list` and `/api/fs/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEntry {
    /// Absolute path on the backend host.
    pub path: String,
    /// Base name.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Permission string (e.g. `-rw-r--r--`).
    #[serde(default)]
    pub mode: String,
    /// Modification time, as sent by the backend.
    #[serde(default)]
    pub mod_time: Option<serde_json::Value>,
    /// `true` for directories.
    #[serde(default)]
    pub is_dir: bool,
}

/// `{items: [...]}` wrapper, or a bare array from older backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ItemsResponse {
    Wrapped { items: Vec<FsEntry> },
    Bare(Vec<FsEntry>),
}

impl ItemsResponse {
    pub(crate) fn into_items(self) -> Vec<FsEntry> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

/// File or folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Folder,
}

/// Normalized directory entry for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileItem {
    /// Stable id (the path).
    pub id: String,
    /// Base name.
    pub name: String,
    /// Full path.
    pub path: String,
    /// File or folder.
    pub kind: FileKind,
    /// Lowercased extension without the dot, for files that have one.
    pub extension: Option<String>,
    /// Size in bytes.
    pub size: u64,
}

impl From<FsEntry> for FileItem {
    fn from(entry: FsEntry) -> Self {
        let kind = if entry.is_dir {
            FileKind::Folder
        } else {
            FileKind::File
        };
        let extension = match kind {
            FileKind::File => entry
                .name
                .rsplit_once('.')
                .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
                .map(|(_, ext)| ext.to_ascii_lowercase()),
            FileKind::Folder => None,
        };
        Self {
            id: entry.path.clone(),
            name: entry.name,
            path: entry.path,
            kind,
            extension,
            size: entry.size,
        }
    }
}

/// Body of `POST /api/fs/write`.
#[derive(Debug, Serialize)]
pub(crate) struct WriteRequest<'a> {
    pub path: &'a str,
    /// Base64 of the file contents.
    pub content: String,
}

/// Body of `POST /api/fs/mkdir`.
#[derive(Debug, Serialize)]
pub(crate) struct PathRequest<'a> {
    pub path: &'a str,
}

/// Body of `POST /api/fs/register`.
#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub path: &'a str,
}
