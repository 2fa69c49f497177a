//! Async runtime for the terminal state machine.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────── Driver::run ────────────┐
//! DriverHandle ─Action─┼─> Terminal::apply ──┐               │
//!                      │                     ├─> execute(Effect)
//! socket/timer tasks ──┼─> Terminal::handle ─┘       │       │
//!        ^   TerminalEvent (one unbounded channel)   │       │
//!        └───────────────────────────────────────────┘       │
//!                      │  watch<Arc<TerminalSnapshot>> ──────┼─> renderers
//!                      └─────────────────────────────────────┘
//! ```
//!
//! The driver is the only owner of the [`Terminal`]. Session requests,
//! socket I/O and timers run in spawned tasks that report back through
//! the event channel, so the state machine sees one event at a time in
//! arrival order. After every event the driver publishes a fresh
//! immutable snapshot; renderers never see a pane mid-update.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::backend::TerminalBackend;
use super::line::LineId;
use super::pane::PaneId;
use super::{Action, Effect, Terminal, TerminalEvent, TerminalSnapshot};
use crate::ws::{self, WsMessage};

/// Instruction for a socket task.
#[derive(Debug)]
enum SocketCommand {
    Text { payload: String, line: Option<LineId> },
    Close,
}

/// Driver-side handle to one socket task.
#[derive(Debug)]
struct SocketHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

/// Client side of a running [`Driver`].
#[derive(Debug, Clone)]
pub struct DriverHandle {
    actions: mpsc::UnboundedSender<Action>,
    snapshots: watch::Receiver<Arc<TerminalSnapshot>>,
}

impl DriverHandle {
    /// Queue a user action.
    pub fn send(&self, action: Action) -> anyhow::Result<()> {
        self.actions
            .send(action)
            .map_err(|_closed| anyhow::anyhow!("terminal driver has stopped"))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<TerminalSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TerminalSnapshot>> {
        self.snapshots.clone()
    }
}

/// Executes [`Effect`]s and feeds results back into the [`Terminal`].
pub struct Driver<B> {
    terminal: Terminal,
    backend: Arc<B>,
    open_timeout: Duration,
    events_tx: mpsc::UnboundedSender<TerminalEvent>,
    events_rx: mpsc::UnboundedReceiver<TerminalEvent>,
    actions_rx: mpsc::UnboundedReceiver<Action>,
    snapshot_tx: watch::Sender<Arc<TerminalSnapshot>>,
    sockets: HashMap<PaneId, SocketHandle>,
}

impl<B> std::fmt::Debug for Driver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("terminal", &self.terminal)
            .field("open_timeout", &self.open_timeout)
            .field("sockets", &self.sockets)
            .finish_non_exhaustive()
    }
}

impl<B: TerminalBackend + 'static> Driver<B> {
    /// Wrap `terminal`. Socket handshakes are bounded by `open_timeout`.
    pub fn new(terminal: Terminal, backend: Arc<B>, open_timeout: Duration) -> (Self, DriverHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(terminal.snapshot()));
        let driver = Self {
            terminal,
            backend,
            open_timeout,
            events_tx,
            events_rx,
            actions_rx,
            snapshot_tx,
            sockets: HashMap::new(),
        };
        let handle = DriverHandle {
            actions: actions_tx,
            snapshots: snapshot_rx,
        };
        (driver, handle)
    }

    /// Spawn the driver on the current runtime.
    pub fn spawn(
        terminal: Terminal,
        backend: Arc<B>,
        open_timeout: Duration,
    ) -> (DriverHandle, JoinHandle<()>) {
        let (driver, handle) = Self::new(terminal, backend, open_timeout);
        (handle, tokio::spawn(driver.run()))
    }

    /// Process actions and events until [`Action::Shutdown`] arrives or
    /// every [`DriverHandle`] is dropped, then close all sockets.
    pub async fn run(mut self) {
        log::info!("Terminal driver started");
        loop {
            let effects = tokio::select! {
                Some(event) = self.events_rx.recv() => self.terminal.handle(event),
                action = self.actions_rx.recv() => match action {
                    Some(Action::Shutdown) | None => break,
                    Some(action) => self.terminal.apply(action),
                },
            };
            self.execute(effects);
            self.publish();
        }

        let effects = self.terminal.shutdown();
        self.execute(effects);
        self.publish();
        log::info!("Terminal driver stopped");
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(Arc::new(self.terminal.snapshot()));
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CreateSession { pane, generation } => {
                    self.create_session(pane, generation);
                }
                Effect::OpenSocket {
                    pane,
                    generation,
                    session_id,
                } => self.open_socket(pane, generation, &session_id),
                Effect::Send {
                    pane,
                    generation,
                    payload,
                    line,
                } => self.send(pane, generation, payload, line),
                Effect::CloseSocket { pane, generation } => self.close_socket(pane, generation),
                Effect::Schedule { delay, event } => {
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        // Driver gone means nobody is waiting for the timer.
                        let _ = events.send(event);
                    });
                }
            }
        }
    }

    fn create_session(&self, pane: PaneId, generation: u64) {
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match backend.create_session().await {
                Ok(session_id) => TerminalEvent::SessionCreated {
                    pane,
                    generation,
                    session_id,
                },
                Err(e) => TerminalEvent::SessionFailed {
                    pane,
                    generation,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn open_socket(&mut self, pane: PaneId, generation: u64, session_id: &str) {
        let url = match self.backend.socket_url(session_id) {
            Ok(url) => url,
            Err(e) => {
                let _ = self.events_tx.send(TerminalEvent::SocketOpenFailed {
                    pane,
                    generation,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let previous = self.sockets.insert(
            pane,
            SocketHandle {
                generation,
                commands: commands_tx,
            },
        );
        if let Some(previous) = previous {
            log::debug!(
                "[Terminal {pane}] Replacing socket of generation {}",
                previous.generation
            );
            let _ = previous.commands.send(SocketCommand::Close);
        }

        tokio::spawn(socket_task(
            pane,
            generation,
            url,
            self.open_timeout,
            commands_rx,
            self.events_tx.clone(),
        ));
    }

    fn send(&mut self, pane: PaneId, generation: u64, payload: String, line: Option<LineId>) {
        let command = SocketCommand::Text {
            payload,
            line: line.clone(),
        };
        let delivered = match self.sockets.get(&pane) {
            Some(handle) if handle.generation == generation => {
                handle.commands.send(command).is_ok()
            }
            _ => false,
        };
        if !delivered {
            let _ = self.events_tx.send(TerminalEvent::SendFailed {
                pane,
                generation,
                line,
                reason: "socket is not open".to_string(),
            });
        }
    }

    fn close_socket(&mut self, pane: PaneId, generation: u64) {
        let current = self
            .sockets
            .get(&pane)
            .is_some_and(|handle| handle.generation == generation);
        if !current {
            return;
        }
        if let Some(handle) = self.sockets.remove(&pane) {
            let _ = handle.commands.send(SocketCommand::Close);
        }
    }
}

/// Own one socket from handshake to close, reporting to the driver.
async fn socket_task(
    pane: PaneId,
    generation: u64,
    url: String,
    open_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<TerminalEvent>,
) {
    log::debug!("[Terminal {pane}] Opening {url}");
    let (mut writer, mut reader) = tokio::select! {
        result = ws::connect(&url, open_timeout) => match result {
            Ok(halves) => halves,
            Err(e) => {
                let _ = events.send(TerminalEvent::SocketOpenFailed {
                    pane,
                    generation,
                    reason: format!("{e:#}"),
                });
                return;
            }
        },
        // Only a close can arrive before the socket is reported open.
        _ = commands.recv() => {
            log::debug!("[Terminal {pane}] Socket closed during handshake");
            return;
        }
    };
    let _ = events.send(TerminalEvent::SocketOpened { pane, generation });

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Text { payload, line }) => {
                    if let Err(e) = writer.send_text(&payload).await {
                        let _ = events.send(TerminalEvent::SendFailed {
                            pane,
                            generation,
                            line,
                            reason: format!("{e:#}"),
                        });
                    }
                }
                Some(SocketCommand::Close) | None => {
                    if let Err(e) = writer.close().await {
                        log::debug!("[Terminal {pane}] Close failed: {e:#}");
                    }
                    return;
                }
            },
            message = reader.recv() => match message {
                Some(Ok(WsMessage::Text(data))) => {
                    let _ = events.send(TerminalEvent::SocketMessage { pane, generation, data });
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let _ = events.send(TerminalEvent::SocketMessage {
                        pane,
                        generation,
                        data: String::from_utf8_lossy(&bytes).into_owned(),
                    });
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        log::debug!("[Terminal {pane}] Pong failed: {e:#}");
                    }
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    log::info!("[Terminal {pane}] Server closed socket: {code} {reason}");
                    let _ = events.send(TerminalEvent::SocketClosed {
                        pane,
                        generation,
                        code: Some(code),
                    });
                    return;
                }
                Some(Err(e)) => {
                    let _ = events.send(TerminalEvent::SocketError {
                        pane,
                        generation,
                        reason: format!("{e:#}"),
                    });
                    let _ = events.send(TerminalEvent::SocketClosed {
                        pane,
                        generation,
                        code: None,
                    });
                    return;
                }
                None => {
                    let _ = events.send(TerminalEvent::SocketClosed {
                        pane,
                        generation,
                        code: None,
                    });
                    return;
                }
            },
        }
    }
}
