//! Glask - terminal session manager and filesystem client for the Glask
//! workspace backend.
//!
//! # Architecture
//!
//! - **Terminal** - Pane table state machine: sessions, retries, split view
//! - **Driver** - Tokio runtime adapter executing the terminal's effects
//! - **Sanitizer** - ANSI/control sequence cleanup for the flat line view
//! - **Fs** - Cached HTTP client for the workspace filesystem API
//!
//! # Modules
//!
//! - [`terminal`] - Panes, lines, connector, dispatcher, driver
//! - [`fs`] - Filesystem client, TTL cache, workspace registration
//! - [`ws`] - WebSocket transport
//! - [`config`] - Configuration loading/saving

pub mod config;
pub mod constants;
pub mod env;
pub mod fs;
pub mod terminal;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use fs::FsClient;
pub use terminal::driver::{Driver, DriverHandle};
pub use terminal::{
    Action, Effect, LineStatus, PaneId, Terminal, TerminalEvent, TerminalSettings,
    TerminalSnapshot,
};
