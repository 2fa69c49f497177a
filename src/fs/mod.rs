//! Filesystem backend client with a TTL cache and workspace registration.

pub mod cache;
pub mod client;
pub mod types;
pub mod workspace;

pub use cache::TtlCache;
pub use client::FsClient;
pub use types::{FileItem, FileKind, FsEntry};
pub use workspace::{normalize_path, Workspace, WorkspaceStore};
