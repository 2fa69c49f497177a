//! Workspace registration and path normalization.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registered workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Display name.
    pub name: String,
    /// Root path on the backend host (normalized).
    pub path: String,
    /// Registration time.
    pub timestamp: DateTime<Utc>,
}

impl Workspace {
    /// Workspace registered now.
    pub fn new(name: impl Into<String>, path: &str) -> Self {
        Self {
            name: name.into(),
            path: normalize_path(path, None),
            timestamp: Utc::now(),
        }
    }
}

/// JSON file holding the current [`Workspace`].
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    file: PathBuf,
}

impl WorkspaceStore {
    /// Store backed by `file`.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    /// Backing file.
    pub fn file(&self) -> &std::path::Path {
        &self.file
    }

    /// Registered workspace, if any.
    pub fn load(&self) -> Result<Option<Workspace>> {
        match fs::read_to_string(&self.file) {
            Ok(content) => {
                let workspace = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid workspace file {}", self.file.display()))?;
                Ok(Some(workspace))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.file.display())),
        }
    }

    /// Persist `workspace`.
    pub fn save(&self, workspace: &Workspace) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file, serde_json::to_string_pretty(workspace)?)
            .with_context(|| format!("Failed to write {}", self.file.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&self.file, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Forget the registration.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.file.display())),
        }
    }
}

/// Normalize a user-supplied path.
///
/// Backslashes become `/` and trailing slashes are dropped (the root `/`
/// stays). Relative paths are joined onto the workspace root when one is
/// registered; absolute paths and drive paths (`C:/...`) are kept.
pub fn normalize_path(path: &str, workspace: Option<&Workspace>) -> String {
    let unified = path.trim().replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    if trimmed.is_empty() && unified.starts_with('/') {
        return "/".to_string();
    }
    if is_absolute(trimmed) {
        return trimmed.to_string();
    }

    let relative = trimmed.trim_start_matches("./");
    match workspace {
        Some(ws) if relative.is_empty() || relative == "." => ws.path.clone(),
        Some(ws) if ws.path == "/" => format!("/{relative}"),
        Some(ws) => format!("{}/{relative}", ws.path),
        None => relative.to_string(),
    }
}

/// Parent directory of a normalized path (`/` for top-level entries).
pub fn parent_dir(path: &str) -> Option<String> {
    match path.rsplit_once('/') {
        Some(("", name)) if !name.is_empty() => Some("/".to_string()),
        Some((parent, _)) if !parent.is_empty() => Some(parent.to_string()),
        _ => None,
    }
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(path: &str) -> Workspace {
        Workspace::new("demo", path)
    }

    #[test]
    fn backslashes_and_trailing_slashes() {
        assert_eq!(normalize_path("C:\\Users\\me\\proj\\", None), "C:/Users/me/proj");
        assert_eq!(normalize_path("/srv/app///", None), "/srv/app");
        assert_eq!(normalize_path("/", None), "/");
    }

    #[test]
    fn relative_paths_join_workspace() {
        let ws = workspace("/home/me/proj/");
        assert_eq!(ws.path, "/home/me/proj");
        assert_eq!(normalize_path("src/main.rs", Some(&ws)), "/home/me/proj/src/main.rs");
        assert_eq!(normalize_path("./README.md", Some(&ws)), "/home/me/proj/README.md");
        assert_eq!(normalize_path("", Some(&ws)), "/home/me/proj");
        assert_eq!(normalize_path("/etc/hosts", Some(&ws)), "/etc/hosts");
    }

    #[test]
    fn relative_without_workspace_is_kept() {
        assert_eq!(normalize_path("src\\lib.rs", None), "src/lib.rs");
    }

    #[test]
    fn parent_dir_cases() {
        assert_eq!(parent_dir("/a/b/c.txt").as_deref(), Some("/a/b"));
        assert_eq!(parent_dir("/a").as_deref(), Some("/"));
        assert_eq!(parent_dir("/"), None);
        assert_eq!(parent_dir("file"), None);
    }

    #[test]
    fn store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().join("workspace.json"));
        assert_eq!(store.load().unwrap(), None);

        let ws = workspace("/home/me/proj");
        store.save(&ws).unwrap();
        assert_eq!(store.load().unwrap(), Some(ws));

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
