//! Application-wide constants for glask.
//!
//! This module centralizes the timing and sizing defaults used by the
//! terminal session manager and the filesystem client. `Config` starts from
//! these values and may override most of them.
//!
//! # Categories
//!
//! - **Timeouts**: Network and liveness deadlines
//! - **Retry**: Session creation backoff and reconnect delays
//! - **Layout**: Monospace cell metrics for pixel → rows/cols estimates
//! - **Cache**: Filesystem listing/content TTL

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for backend API calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a WebSocket handshake to complete after session creation.
pub const SOCKET_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Soft timeout after which a pending command is marked as timed out.
///
/// Advisory only: the command keeps running and the socket stays open.
pub const COMMAND_SOFT_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Retry
// ============================================================================

/// First delay of the session creation backoff.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff delay.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Consecutive failed connection attempts before a pane gives up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay before reconnecting after a socket closes.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Layout
// ============================================================================

/// Width of one monospace cell in pixels (13px font).
pub const CELL_WIDTH_PX: f64 = 7.8;

/// Height of one monospace cell in pixels (13px font, 1.4 line height).
pub const CELL_HEIGHT_PX: f64 = 18.2;

/// Minimum columns accepted for a resize.
pub const MIN_COLS: u16 = 20;

/// Minimum rows accepted for a resize.
pub const MIN_ROWS: u16 = 2;

/// Initial dimensions assumed before the first resize arrives.
pub const DEFAULT_DIMS: (u16, u16) = (24, 80);

// ============================================================================
// Cache
// ============================================================================

/// Time-to-live for cached directory listings and file contents.
pub const FS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default result cap for filesystem searches.
pub const FS_SEARCH_MAX_RESULTS: usize = 50;
