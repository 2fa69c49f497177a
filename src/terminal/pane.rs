//! Terminal panes and their connection lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Idle ──connect()──> CreatingSession ──SessionCreated──> Opening ──SocketOpened──> Connected
//!                        │   ^                              │                         │
//!            SessionFailed   RetryDue           SocketOpenFailed                SocketClosed
//!                        v   │                              v                         v
//!                    Reconnecting <─────────────────────────┘     Reconnecting ──ReconnectDue──> CreatingSession
//!                        │
//!                  attempts exhausted
//!                        v
//!                      Failed
//! ```

use serde::Serialize;

use super::line::{LineBuffer, LineStatus};

/// Pane slot. At most two panes exist: single view and split view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneId {
    /// Primary pane, created when the terminal opens.
    Left,
    /// Secondary pane, exists only while split.
    Right,
}

impl PaneId {
    /// Wire/display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaneId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => anyhow::bail!("unknown pane '{other}' (expected left or right)"),
        }
    }
}

/// Connection lifecycle of one pane.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaneConnection {
    /// No session and nothing scheduled.
    #[default]
    Idle,
    /// Session creation request in flight.
    CreatingSession,
    /// Session issued, socket handshake in flight.
    Opening {
        /// Backend session id.
        session_id: String,
    },
    /// Socket open and ready.
    Connected {
        /// Backend session id.
        session_id: String,
    },
    /// Waiting for a scheduled retry or reconnect.
    Reconnecting {
        /// Consecutive failed attempts so far (0 after a clean disconnect).
        attempt: u32,
        /// Delay before the next attempt.
        next_retry_ms: u64,
    },
    /// Retries exhausted. Only an explicit `connect` leaves this state.
    Failed {
        /// Last failure reason.
        reason: String,
    },
}

impl PaneConnection {
    /// Session id while a session is bound.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Opening { session_id } | Self::Connected { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// `true` while a session request or handshake is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::CreatingSession | Self::Opening { .. })
    }

    /// `true` when commands can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// `true` if a socket may exist for the current generation.
    pub fn has_socket(&self) -> bool {
        matches!(self, Self::Opening { .. } | Self::Connected { .. })
    }
}

/// One terminal view bound to at most one live session.
#[derive(Debug, Clone)]
pub struct Pane {
    id: PaneId,
    /// Unique per pane creation; a recreated pane never shares it.
    pub(super) instance: u64,
    /// Current connection generation; events tagged with another one are stale.
    pub(super) generation: u64,
    pub(super) lines: LineBuffer,
    pub(super) input: String,
    pub(super) command_status: LineStatus,
    pub(super) connection: PaneConnection,
    pub(super) retry_count: u32,
    pub(super) dims: Option<(u16, u16)>,
}

impl Pane {
    pub(super) fn new(id: PaneId, instance: u64) -> Self {
        Self {
            id,
            instance,
            generation: 0,
            lines: LineBuffer::new(id),
            input: String::new(),
            command_status: LineStatus::None,
            connection: PaneConnection::Idle,
            retry_count: 0,
            dims: None,
        }
    }

    /// Pane slot.
    pub fn id(&self) -> PaneId {
        self.id
    }

    /// Output and command lines.
    pub fn lines(&self) -> &LineBuffer {
        &self.lines
    }

    /// In-progress input text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Status dot for the input prompt.
    pub fn command_status(&self) -> LineStatus {
        self.command_status
    }

    /// Connection lifecycle state.
    pub fn connection(&self) -> &PaneConnection {
        &self.connection
    }

    /// Session id, if bound.
    pub fn session_id(&self) -> Option<&str> {
        self.connection.session_id()
    }

    /// Consecutive failed connection attempts.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Current connection generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last dimensions sent or recorded, `(rows, cols)`.
    pub fn dims(&self) -> Option<(u16, u16)> {
        self.dims
    }
}
