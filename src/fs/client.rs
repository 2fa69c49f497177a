//! HTTP client for the filesystem backend.
//!
//! Listings and file contents are cached per normalized path for the
//! configured TTL. Writes update the file cache and invalidate the parent
//! listing; registering or clearing a workspace drops everything.

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::{Client, Response};

use super::cache::TtlCache;
use super::types::{FileItem, ItemsResponse, PathRequest, RegisterRequest, WriteRequest};
use super::workspace::{normalize_path, parent_dir, Workspace, WorkspaceStore};
use crate::constants;

/// Client for `/api/fs/*`.
#[derive(Debug)]
pub struct FsClient {
    http: Client,
    base_url: String,
    files: TtlCache<String>,
    dirs: TtlCache<Vec<FileItem>>,
    workspace: Option<Workspace>,
    store: Option<WorkspaceStore>,
}

impl FsClient {
    /// Client for the backend at `base_url` with the given cache TTL.
    pub fn new(base_url: impl Into<String>, ttl: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, base_url, ttl))
    }

    /// Client with a pre-configured HTTP client.
    pub fn with_client(http: Client, base_url: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            files: TtlCache::new(ttl),
            dirs: TtlCache::new(ttl),
            workspace: None,
            store: None,
        }
    }

    /// Persist the workspace registration in `store`, loading any saved one.
    pub fn with_store(mut self, store: WorkspaceStore) -> Result<Self> {
        self.workspace = store.load()?;
        if let Some(ws) = &self.workspace {
            log::debug!("Loaded workspace {} at {}", ws.name, ws.path);
        }
        self.store = Some(store);
        Ok(self)
    }

    /// Registered workspace, if any.
    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Normalize `path` against the registered workspace.
    pub fn normalize(&self, path: &str) -> String {
        normalize_path(path, self.workspace.as_ref())
    }

    /// List a directory.
    ///
    /// A failed request falls back to the last cached listing, even an
    /// expired one.
    pub async fn list(&mut self, path: &str, recursive: bool) -> Result<Vec<FileItem>> {
        let path = self.normalize(path);
        let key = listing_key(&path, recursive);
        if let Some(items) = self.dirs.get(&key) {
            log::debug!("Listing cache hit: {key}");
            return Ok(items);
        }

        let fetched = self.fetch_list(&path, recursive).await;
        match fetched {
            Ok(items) => {
                self.dirs.insert(key, items.clone());
                Ok(items)
            }
            Err(e) => match self.dirs.get_stale(&key) {
                Some(items) => {
                    log::warn!("Serving stale listing for {path}: {e:#}");
                    Ok(items)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_list(&self, path: &str, recursive: bool) -> Result<Vec<FileItem>> {
        let url = format!("{}/api/fs/list", self.base_url);
        let recursive = if recursive { "true" } else { "false" };
        let response = self
            .http
            .get(&url)
            .query(&[("path", path), ("recursive", recursive)])
            .send()
            .await
            .with_context(|| format!("list {path}"))?;
        let body: ItemsResponse = ensure_success(response, "list")
            .await?
            .json()
            .await
            .context("invalid list response")?;
        Ok(body.into_items().into_iter().map(FileItem::from).collect())
    }

    /// Read a file as text. Falls back to stale cache on failure.
    pub async fn read(&mut self, path: &str) -> Result<String> {
        let path = self.required_path(path, "read")?;
        if let Some(content) = self.files.get(&path) {
            log::debug!("File cache hit: {path}");
            return Ok(content);
        }

        let fetched = self.fetch_file(&path).await;
        match fetched {
            Ok(content) => {
                self.files.insert(path, content.clone());
                Ok(content)
            }
            Err(e) => match self.files.get_stale(&path) {
                Some(content) => {
                    log::warn!("Serving stale content for {path}: {e:#}");
                    Ok(content)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_file(&self, path: &str) -> Result<String> {
        let url = format!("{}/api/fs/read", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("path", path)])
            .send()
            .await
            .with_context(|| format!("read {path}"))?;
        ensure_success(response, "read")
            .await?
            .text()
            .await
            .context("invalid read response")
    }

    /// Write `content` to `path` (sent base64-encoded).
    pub async fn write(&mut self, path: &str, content: &str) -> Result<()> {
        let path = self.required_path(path, "write")?;
        let url = format!("{}/api/fs/write", self.base_url);
        let body = WriteRequest {
            path: &path,
            content: base64::engine::general_purpose::STANDARD.encode(content),
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("write {path}"))?;
        ensure_success(response, "write").await?;

        log::info!("Wrote {path} ({} bytes)", content.len());
        self.invalidate_parent(&path);
        self.files.insert(path, content.to_string());
        Ok(())
    }

    /// Create a directory.
    pub async fn mkdir(&mut self, path: &str) -> Result<()> {
        let path = self.required_path(path, "mkdir")?;
        let url = format!("{}/api/fs/mkdir", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&PathRequest { path: &path })
            .send()
            .await
            .with_context(|| format!("mkdir {path}"))?;
        ensure_success(response, "mkdir").await?;

        log::info!("Created directory {path}");
        self.invalidate_parent(&path);
        Ok(())
    }

    /// Search file names. Blank queries return nothing without a request.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<FileItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/fs/search", self.base_url);
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[("query", query), ("maxResults", max_results.as_str())])
            .send()
            .await
            .with_context(|| format!("search {query}"))?;
        let body: ItemsResponse = ensure_success(response, "search")
            .await?
            .json()
            .await
            .context("invalid search response")?;
        Ok(body.into_items().into_iter().map(FileItem::from).collect())
    }

    /// Register `path` as the workspace root. Clears every cache.
    pub async fn register(&mut self, name: &str, path: &str) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("register: workspace name is required");
        }
        let root = normalize_path(path, None);
        if root.is_empty() {
            anyhow::bail!("register: workspace path is required");
        }
        let url = format!("{}/api/fs/register", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest { name, path: &root })
            .send()
            .await
            .with_context(|| format!("register {root}"))?;
        ensure_success(response, "register").await?;

        let workspace = Workspace::new(name, &root);
        if let Some(store) = &self.store {
            store.save(&workspace)?;
        }
        log::info!("Registered workspace {name} at {root}");
        self.workspace = Some(workspace.clone());
        self.clear_cache();
        Ok(workspace)
    }

    /// Forget the registered workspace, on disk too. Clears every cache.
    pub fn clear_workspace(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            store.clear()?;
        }
        if let Some(ws) = self.workspace.take() {
            log::info!("Cleared workspace {} at {}", ws.name, ws.path);
        }
        self.clear_cache();
        Ok(())
    }

    /// Drop all cached listings and contents.
    pub fn clear_cache(&mut self) {
        log::debug!(
            "Dropping {} cached files and {} listings",
            self.files.len(),
            self.dirs.len()
        );
        self.files.clear();
        self.dirs.clear();
    }

    fn required_path(&self, path: &str, op: &str) -> Result<String> {
        if path.trim().is_empty() {
            anyhow::bail!("{op}: path is required");
        }
        Ok(self.normalize(path))
    }

    fn invalidate_parent(&mut self, path: &str) {
        if let Some(parent) = parent_dir(path) {
            self.dirs.remove(&listing_key(&parent, false));
            self.dirs.remove(&listing_key(&parent, true));
        }
    }
}

fn listing_key(path: &str, recursive: bool) -> String {
    if recursive {
        format!("{path}/**")
    } else {
        path.to_string()
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        anyhow::bail!("{what} failed: {status}");
    }
    anyhow::bail!("{what} failed: {status}: {body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> FsClient {
        FsClient::with_client(Client::new(), "http://127.0.0.1:1/", Duration::from_secs(60))
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        assert_eq!(client().base_url, "http://127.0.0.1:1");
    }

    #[test]
    fn listing_keys_differ_by_recursion() {
        assert_ne!(listing_key("/a", false), listing_key("/a", true));
    }

    #[tokio::test]
    async fn empty_paths_fail_before_any_request() {
        let mut fs = client();
        assert!(fs.read("  ").await.is_err());
        assert!(fs.write("", "x").await.is_err());
        assert!(fs.mkdir("").await.is_err());
    }

    #[tokio::test]
    async fn blank_search_is_empty() {
        assert!(client().search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cached_read_survives_unreachable_backend() {
        let mut fs = client();
        fs.files.insert("/w/a.txt", "cached".to_string());
        assert_eq!(fs.read("/w/a.txt").await.unwrap(), "cached");
    }
}
