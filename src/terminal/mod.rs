//! Terminal session manager.
//!
//! # Architecture
//!
//! ```text
//! UI / CLI ──Action──> Driver ──apply()/handle()──> Terminal (pane table)
//!                        ^                              │
//!                        │                              v
//!                  TerminalEvent <── sockets/timers <── Vec<Effect>
//! ```
//!
//! [`Terminal`] is a synchronous state machine. It owns every [`Pane`],
//! never performs I/O, and answers each input with a list of [`Effect`]s
//! for the [`Driver`](driver::Driver) to execute. The driver feeds
//! results back as [`TerminalEvent`]s over a single channel, so all pane
//! mutations happen in one place, one event at a time.
//!
//! Every connection attempt gets a fresh generation number. Socket and
//! timer events carry the generation they were issued for; a pane whose
//! generation has moved on (reconnect, close, recreation) drops them.

// Rust guideline compliant 2026-02

pub mod backend;
mod connector;
mod coordinator;
mod dispatcher;
pub mod driver;
pub mod line;
pub mod pane;
pub mod protocol;
pub mod retry;
pub mod sanitize;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::constants;

pub use line::{Line, LineBuffer, LineId, LineStatus};
pub use pane::{Pane, PaneConnection, PaneId};
pub use protocol::{OutboundFrame, WireFormat};
pub use retry::RetryPolicy;
pub use sanitize::sanitize;

/// Tunables consumed by [`Terminal`]. Built from [`Config`](crate::config::Config).
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSettings {
    /// Encoding for outbound commands.
    pub wire_format: WireFormat,
    /// Backoff for failed session creation / socket open.
    pub retry: RetryPolicy,
    /// Fixed delay before reconnecting after a socket closes.
    pub reconnect_delay: Duration,
    /// Soft timeout after which a silent command is flagged.
    pub command_timeout: Duration,
    /// Monospace cell width in pixels.
    pub cell_width_px: f64,
    /// Monospace cell height in pixels.
    pub cell_height_px: f64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::default(),
            retry: RetryPolicy::default(),
            reconnect_delay: constants::RECONNECT_DELAY,
            command_timeout: constants::COMMAND_SOFT_TIMEOUT,
            cell_width_px: constants::CELL_WIDTH_PX,
            cell_height_px: constants::CELL_HEIGHT_PX,
        }
    }
}

/// Transport and timer events fed back into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Backend issued a session id.
    SessionCreated {
        /// Target pane.
        pane: PaneId,
        /// Generation the request was issued for.
        generation: u64,
        /// Backend session id.
        session_id: String,
    },
    /// Session creation request failed.
    SessionFailed {
        /// Target pane.
        pane: PaneId,
        /// Generation the request was issued for.
        generation: u64,
        /// Human readable failure.
        reason: String,
    },
    /// Socket handshake completed.
    SocketOpened {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
    },
    /// Socket handshake failed or timed out.
    SocketOpenFailed {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Human readable failure.
        reason: String,
    },
    /// Text received from the backend.
    SocketMessage {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Raw output chunk.
        data: String,
    },
    /// Transport error on an open socket. A `SocketClosed` follows.
    SocketError {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Human readable failure.
        reason: String,
    },
    /// Socket closed (clean or not).
    SocketClosed {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Close code, if the peer sent one.
        code: Option<u16>,
    },
    /// Writing a frame to the socket failed.
    SendFailed {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Command line the frame belonged to.
        line: Option<LineId>,
        /// Human readable failure.
        reason: String,
    },
    /// Backoff delay after a failed attempt elapsed.
    RetryDue {
        /// Target pane.
        pane: PaneId,
        /// Generation that failed.
        generation: u64,
    },
    /// Fixed delay after a disconnect elapsed.
    ReconnectDue {
        /// Target pane.
        pane: PaneId,
        /// Generation that disconnected.
        generation: u64,
    },
    /// Soft command timeout elapsed.
    CommandTimeout {
        /// Target pane.
        pane: PaneId,
        /// Pane instance the command was submitted to.
        instance: u64,
        /// Command line to flag.
        line: LineId,
    },
}

impl TerminalEvent {
    /// Pane the event is addressed to.
    pub fn pane(&self) -> PaneId {
        match self {
            Self::SessionCreated { pane, .. }
            | Self::SessionFailed { pane, .. }
            | Self::SocketOpened { pane, .. }
            | Self::SocketOpenFailed { pane, .. }
            | Self::SocketMessage { pane, .. }
            | Self::SocketError { pane, .. }
            | Self::SocketClosed { pane, .. }
            | Self::SendFailed { pane, .. }
            | Self::RetryDue { pane, .. }
            | Self::ReconnectDue { pane, .. }
            | Self::CommandTimeout { pane, .. } => *pane,
        }
    }
}

/// User-initiated operations, as sent by a UI to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Connect the initial pane.
    Open,
    /// Submit a command line.
    Submit {
        /// Target pane.
        pane: PaneId,
        /// Typed text.
        text: String,
    },
    /// Replace the in-progress input.
    SetInput {
        /// Target pane.
        pane: PaneId,
        /// Input text.
        text: String,
    },
    /// Toggle split view.
    Split,
    /// Move focus.
    Focus(PaneId),
    /// New character dimensions.
    Resize {
        /// Target pane.
        pane: PaneId,
        /// Rows.
        rows: u16,
        /// Columns.
        cols: u16,
    },
    /// New pixel dimensions, converted with the configured cell metrics.
    ResizePixels {
        /// Target pane.
        pane: PaneId,
        /// Width in pixels.
        width: f64,
        /// Height in pixels.
        height: f64,
    },
    /// Tear down one pane's connection (and remove it, for `right`).
    ClosePane(PaneId),
    /// Close every socket and stop.
    Shutdown,
}

/// I/O requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// `POST /api/terminal/session`, then report `SessionCreated`/`SessionFailed`.
    CreateSession {
        /// Requesting pane.
        pane: PaneId,
        /// Attempt generation.
        generation: u64,
    },
    /// Open the session socket, then report `SocketOpened`/`SocketOpenFailed`.
    OpenSocket {
        /// Requesting pane.
        pane: PaneId,
        /// Attempt generation.
        generation: u64,
        /// Session to attach to.
        session_id: String,
    },
    /// Write one text frame.
    Send {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
        /// Encoded frame.
        payload: String,
        /// Command line this frame carries, for failure reporting.
        line: Option<LineId>,
    },
    /// Close the socket of `generation`, if still open.
    CloseSocket {
        /// Target pane.
        pane: PaneId,
        /// Socket generation.
        generation: u64,
    },
    /// Deliver `event` back after `delay`.
    Schedule {
        /// Delay.
        delay: Duration,
        /// Event to deliver.
        event: TerminalEvent,
    },
}

/// Connector failures, as reported by a [`TerminalBackend`](backend::TerminalBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Session request could not be sent or read.
    Request(String),
    /// Backend answered with a non-success status.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly empty).
        body: String,
    },
    /// Backend answered 2xx without a usable session id.
    InvalidResponse(String),
    /// Socket handshake failed.
    SocketOpen(String),
    /// Socket handshake did not finish in time.
    Timeout,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "session request failed: {msg}"),
            Self::Rejected { status, body } if body.is_empty() => {
                write!(f, "session request rejected with HTTP {status}")
            }
            Self::Rejected { status, body } => {
                write!(f, "session request rejected with HTTP {status}: {body}")
            }
            Self::InvalidResponse(msg) => write!(f, "invalid session response: {msg}"),
            Self::SocketOpen(msg) => write!(f, "socket open failed: {msg}"),
            Self::Timeout => write!(f, "socket open timed out"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// Render-ready copy of one pane.
#[derive(Debug, Clone, Serialize)]
pub struct PaneSnapshot {
    /// Pane slot.
    pub id: PaneId,
    /// Lines in append order.
    pub lines: Vec<Line>,
    /// In-progress input.
    pub input: String,
    /// Prompt status dot.
    pub command_status: LineStatus,
    /// Connection state.
    pub connection: PaneConnection,
}

/// Immutable view of the whole terminal, replaced wholesale on every change.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalSnapshot {
    /// Focused pane.
    pub active: PaneId,
    /// Panes in display order.
    pub panes: Vec<PaneSnapshot>,
}

impl TerminalSnapshot {
    /// `true` when both panes are shown.
    pub fn is_split(&self) -> bool {
        self.panes.len() > 1
    }

    /// Look up a pane.
    pub fn pane(&self, id: PaneId) -> Option<&PaneSnapshot> {
        self.panes.iter().find(|pane| pane.id == id)
    }
}

/// Authoritative pane table.
#[derive(Debug)]
pub struct Terminal {
    settings: TerminalSettings,
    panes: BTreeMap<PaneId, Pane>,
    active: PaneId,
    /// Source of generations and pane instances. Never reused.
    serial: u64,
}

impl Terminal {
    /// Create the terminal with its initial `left` pane, focused and idle.
    pub fn new(settings: TerminalSettings) -> Self {
        let mut terminal = Self {
            settings,
            panes: BTreeMap::new(),
            active: PaneId::Left,
            serial: 0,
        };
        let instance = terminal.next_serial();
        terminal
            .panes
            .insert(PaneId::Left, Pane::new(PaneId::Left, instance));
        terminal
    }

    /// Settings in effect.
    pub fn settings(&self) -> &TerminalSettings {
        &self.settings
    }

    /// Terminal-open: connect the initial pane.
    pub fn open(&mut self) -> Vec<Effect> {
        self.connect(PaneId::Left)
    }

    /// Panes in display order.
    pub fn panes(&self) -> impl Iterator<Item = &Pane> {
        self.panes.values()
    }

    /// Look up a pane.
    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        self.panes.get(&id)
    }

    /// `true` when the `right` pane exists.
    pub fn is_split(&self) -> bool {
        self.panes.contains_key(&PaneId::Right)
    }

    /// Copy the current state for rendering.
    pub fn snapshot(&self) -> TerminalSnapshot {
        TerminalSnapshot {
            active: self.active,
            panes: self
                .panes
                .values()
                .map(|pane| PaneSnapshot {
                    id: pane.id(),
                    lines: pane.lines.lines().to_vec(),
                    input: pane.input.clone(),
                    command_status: pane.command_status,
                    connection: pane.connection.clone(),
                })
                .collect(),
        }
    }

    /// Apply a transport or timer event.
    pub fn handle(&mut self, event: TerminalEvent) -> Vec<Effect> {
        match event {
            TerminalEvent::SessionCreated {
                pane,
                generation,
                session_id,
            } => self.on_session_created(pane, generation, session_id),
            TerminalEvent::SessionFailed {
                pane,
                generation,
                reason,
            }
            | TerminalEvent::SocketOpenFailed {
                pane,
                generation,
                reason,
            } => self.on_attempt_failed(pane, generation, &reason),
            TerminalEvent::SocketOpened { pane, generation } => {
                self.on_socket_opened(pane, generation)
            }
            TerminalEvent::SocketMessage {
                pane,
                generation,
                data,
            } => self.on_output(pane, generation, &data),
            TerminalEvent::SocketError {
                pane,
                generation,
                reason,
            } => self.on_socket_error(pane, generation, &reason),
            TerminalEvent::SocketClosed {
                pane,
                generation,
                code,
            } => self.on_socket_closed(pane, generation, code),
            TerminalEvent::SendFailed {
                pane,
                generation,
                line,
                reason,
            } => self.on_send_failed(pane, generation, line.as_ref(), &reason),
            TerminalEvent::RetryDue { pane, generation } => {
                self.on_attempt_due(pane, generation, "retry")
            }
            TerminalEvent::ReconnectDue { pane, generation } => {
                self.on_attempt_due(pane, generation, "reconnect")
            }
            TerminalEvent::CommandTimeout {
                pane,
                instance,
                line,
            } => self.on_command_timeout(pane, instance, &line),
        }
    }

    /// Apply a user action.
    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Open => self.open(),
            Action::Submit { pane, text } => self.submit(pane, &text),
            Action::SetInput { pane, text } => {
                self.set_input(pane, text);
                Vec::new()
            }
            Action::Split => self.split_terminal(),
            Action::Focus(pane) => {
                self.set_active_pane(pane);
                Vec::new()
            }
            Action::Resize { pane, rows, cols } => self.resize(pane, rows, cols),
            Action::ResizePixels {
                pane,
                width,
                height,
            } => self.resize_pixels(pane, width, height),
            Action::ClosePane(pane) => self.close_pane(pane),
            Action::Shutdown => self.shutdown(),
        }
    }

    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// Pane addressed by a transport event, if the event is still current.
    fn live_pane(&mut self, id: PaneId, generation: u64, what: &str) -> Option<&mut Pane> {
        match self.panes.get_mut(&id) {
            Some(pane) if pane.generation == generation => Some(pane),
            Some(pane) => {
                log::debug!(
                    "[Terminal {id}] Dropping stale {what} (generation {generation}, current {})",
                    pane.generation
                );
                None
            }
            None => {
                log::debug!("[Terminal {id}] Dropping {what} for removed pane");
                None
            }
        }
    }
}
