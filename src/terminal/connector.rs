//! Session connector transitions.
//!
//! One live transport per pane: create a session, open its socket, retry
//! failed attempts with backoff, and reconnect after a disconnect.

use std::time::Duration;

use super::line::LineStatus;
use super::pane::{PaneConnection, PaneId};
use super::protocol::OutboundFrame;
use super::{Effect, Terminal, TerminalEvent};

impl Terminal {
    /// Start connecting `pane`.
    ///
    /// No-op if the pane does not exist or already has a session request,
    /// handshake or socket in progress. A pane in the `Failed` state starts
    /// over with a fresh retry budget.
    pub fn connect(&mut self, pane: PaneId) -> Vec<Effect> {
        let Some(p) = self.panes.get_mut(&pane) else {
            log::debug!("[Terminal {pane}] connect ignored: no such pane");
            return Vec::new();
        };
        if p.connection.is_connecting() || p.connection.is_connected() {
            log::debug!("[Terminal {pane}] connect ignored: already {:?}", p.connection);
            return Vec::new();
        }
        if matches!(p.connection, PaneConnection::Failed { .. }) {
            p.retry_count = 0;
        }
        self.begin_attempt(pane)
    }

    fn begin_attempt(&mut self, pane: PaneId) -> Vec<Effect> {
        let generation = self.next_serial();
        let Some(p) = self.panes.get_mut(&pane) else {
            return Vec::new();
        };
        p.generation = generation;
        p.connection = PaneConnection::CreatingSession;
        log::info!(
            "[Terminal {pane}] Creating session (attempt {})",
            p.retry_count + 1
        );
        vec![Effect::CreateSession { pane, generation }]
    }

    pub(super) fn on_session_created(
        &mut self,
        pane: PaneId,
        generation: u64,
        session_id: String,
    ) -> Vec<Effect> {
        let Some(p) = self.live_pane(pane, generation, "session") else {
            return Vec::new();
        };
        if p.connection != PaneConnection::CreatingSession {
            log::debug!("[Terminal {pane}] Unexpected session in {:?}", p.connection);
            return Vec::new();
        }
        log::info!("[Terminal {pane}] Session created: {session_id}");
        p.connection = PaneConnection::Opening {
            session_id: session_id.clone(),
        };
        vec![Effect::OpenSocket {
            pane,
            generation,
            session_id,
        }]
    }

    pub(super) fn on_socket_opened(&mut self, pane: PaneId, generation: u64) -> Vec<Effect> {
        let format = self.settings.wire_format;
        let Some(p) = self.live_pane(pane, generation, "socket open") else {
            return Vec::new();
        };
        let PaneConnection::Opening { session_id } = &p.connection else {
            log::debug!("[Terminal {pane}] Unexpected open in {:?}", p.connection);
            return Vec::new();
        };
        let session_id = session_id.clone();
        log::info!("[Terminal {pane}] Connected to session {session_id}");
        p.connection = PaneConnection::Connected { session_id };
        p.retry_count = 0;
        p.lines.push_output("Terminal connected", LineStatus::Success);

        // Bring the new shell in line with dimensions recorded while offline.
        match p.dims {
            Some((rows, cols)) => vec![Effect::Send {
                pane,
                generation,
                payload: OutboundFrame::Resize { rows, cols }.encode(format),
                line: None,
            }],
            None => Vec::new(),
        }
    }

    /// Session creation or socket handshake failed.
    pub(super) fn on_attempt_failed(
        &mut self,
        pane: PaneId,
        generation: u64,
        reason: &str,
    ) -> Vec<Effect> {
        let Some(p) = self.panes.get_mut(&pane) else {
            log::debug!("[Terminal {pane}] Dropping failure for removed pane");
            return Vec::new();
        };
        if p.generation != generation || !p.connection.is_connecting() {
            log::debug!("[Terminal {pane}] Dropping stale failure: {reason}");
            return Vec::new();
        }

        p.retry_count += 1;
        let failures = p.retry_count;
        match self.settings.retry.delay_for(failures) {
            Some(delay) => {
                log::warn!(
                    "[Terminal {pane}] Connection attempt {failures} failed: {reason}; retrying in {delay:?}"
                );
                p.lines.push_output(
                    format!(
                        "Connection failed: {reason}. Retrying in {}s...",
                        format_secs(delay)
                    ),
                    LineStatus::Error,
                );
                p.connection = PaneConnection::Reconnecting {
                    attempt: failures,
                    next_retry_ms: duration_ms(delay),
                };
                vec![Effect::Schedule {
                    delay,
                    event: TerminalEvent::RetryDue { pane, generation },
                }]
            }
            None => {
                log::error!("[Terminal {pane}] Giving up after {failures} attempts: {reason}");
                p.lines.push_output(
                    format!("Connection failed after {failures} attempts: {reason}"),
                    LineStatus::Error,
                );
                p.connection = PaneConnection::Failed {
                    reason: reason.to_string(),
                };
                p.command_status = LineStatus::Error;
                Vec::new()
            }
        }
    }

    pub(super) fn on_socket_error(
        &mut self,
        pane: PaneId,
        generation: u64,
        reason: &str,
    ) -> Vec<Effect> {
        let Some(p) = self.live_pane(pane, generation, "socket error") else {
            return Vec::new();
        };
        log::warn!("[Terminal {pane}] WebSocket error: {reason}");
        p.lines
            .push_output(format!("Terminal connection error: {reason}"), LineStatus::Error);
        Vec::new()
    }

    pub(super) fn on_socket_closed(
        &mut self,
        pane: PaneId,
        generation: u64,
        code: Option<u16>,
    ) -> Vec<Effect> {
        let delay = self.settings.reconnect_delay;
        let Some(p) = self.live_pane(pane, generation, "socket close") else {
            return Vec::new();
        };
        match p.connection {
            PaneConnection::Connected { .. } => {}
            PaneConnection::Opening { .. } => {
                return self.on_attempt_failed(pane, generation, "socket closed during handshake");
            }
            _ => {
                log::debug!("[Terminal {pane}] Close in {:?} ignored", p.connection);
                return Vec::new();
            }
        }

        log::warn!("[Terminal {pane}] WebSocket closed (code {code:?}); reconnecting");
        p.lines.push_output(
            "Terminal disconnected. Attempting to reconnect...",
            LineStatus::Error,
        );
        // The next session runs a new shell; nothing still waiting will answer.
        let abandoned: Vec<_> = p
            .lines
            .lines()
            .iter()
            .filter(|line| line.is_command() && line.status().is_unresolved())
            .map(|line| line.id().clone())
            .collect();
        for id in &abandoned {
            p.lines.set_status(id, LineStatus::Error);
        }
        if !abandoned.is_empty() {
            p.command_status = LineStatus::Error;
        }

        p.retry_count = 0;
        p.connection = PaneConnection::Reconnecting {
            attempt: 0,
            next_retry_ms: duration_ms(delay),
        };
        vec![
            Effect::CloseSocket { pane, generation },
            Effect::Schedule {
                delay,
                event: TerminalEvent::ReconnectDue { pane, generation },
            },
        ]
    }

    /// A scheduled retry or reconnect fired.
    pub(super) fn on_attempt_due(
        &mut self,
        pane: PaneId,
        generation: u64,
        what: &str,
    ) -> Vec<Effect> {
        let Some(p) = self.live_pane(pane, generation, what) else {
            return Vec::new();
        };
        if !matches!(p.connection, PaneConnection::Reconnecting { .. }) {
            log::debug!("[Terminal {pane}] {what} ignored in {:?}", p.connection);
            return Vec::new();
        }
        self.begin_attempt(pane)
    }
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// `2` for whole seconds, `1.5` otherwise.
fn format_secs(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        delay.as_secs().to_string()
    } else {
        format!("{:.1}", delay.as_secs_f64())
    }
}
