//! Command submission and outcome tracking.
//!
//! Completion is inferred: the backend does not frame output per command,
//! so the first output after a submission resolves every command still
//! waiting. Overlapping commands may therefore be marked complete by each
//! other's output.

use super::line::{LineId, LineStatus};
use super::pane::PaneId;
use super::protocol::OutboundFrame;
use super::sanitize::sanitize;
use super::{Effect, Terminal, TerminalEvent};

/// Local command that empties the buffer instead of reaching the shell.
const CLEAR_COMMAND: &str = "clear";

impl Terminal {
    /// Replace the in-progress input of `pane`. Returns `false` if it does not exist.
    pub fn set_input(&mut self, pane: PaneId, text: String) -> bool {
        match self.panes.get_mut(&pane) {
            Some(p) => {
                p.input = text;
                true
            }
            None => false,
        }
    }

    /// Submit the pane's current input.
    pub fn submit_input(&mut self, pane: PaneId) -> Vec<Effect> {
        let Some(text) = self.panes.get(&pane).map(|p| p.input.clone()) else {
            return Vec::new();
        };
        self.submit(pane, &text)
    }

    /// Submit one command line.
    ///
    /// Blank input is ignored and `clear` empties the buffer locally.
    /// Anything else is appended as a pending command line and sent if the
    /// pane is connected; otherwise the line is marked failed with an
    /// explanation.
    pub fn submit(&mut self, pane: PaneId, text: &str) -> Vec<Effect> {
        let command = text.trim();
        if command.is_empty() {
            return Vec::new();
        }
        let format = self.settings.wire_format;
        let timeout = self.settings.command_timeout;
        let Some(p) = self.panes.get_mut(&pane) else {
            return Vec::new();
        };
        p.input.clear();

        if command == CLEAR_COMMAND {
            p.lines.clear();
            p.command_status = LineStatus::Success;
            log::debug!("[Terminal {pane}] Buffer cleared");
            return Vec::new();
        }

        let line = p.lines.push_command(command);
        if !p.connection.is_connected() {
            log::warn!("[Terminal {pane}] Terminal not connected, dropping: {command}");
            p.lines.set_status(&line, LineStatus::Error);
            p.lines
                .push_output("Terminal not connected", LineStatus::Error);
            p.command_status = LineStatus::Error;
            return Vec::new();
        }

        log::debug!("[Terminal {pane}] Sending command: {command}");
        p.command_status = LineStatus::Pending;
        vec![
            Effect::Send {
                pane,
                generation: p.generation,
                payload: OutboundFrame::Command(command.to_string()).encode(format),
                line: Some(line.clone()),
            },
            Effect::Schedule {
                delay: timeout,
                event: TerminalEvent::CommandTimeout {
                    pane,
                    instance: p.instance,
                    line,
                },
            },
        ]
    }

    pub(super) fn on_output(&mut self, pane: PaneId, generation: u64, data: &str) -> Vec<Effect> {
        let Some(p) = self.live_pane(pane, generation, "output") else {
            return Vec::new();
        };
        if p.lines.resolve_pending() > 0 {
            p.command_status = LineStatus::Success;
        }
        let text = sanitize(data);
        if !text.is_empty() {
            p.lines.push_output(text, LineStatus::None);
        }
        Vec::new()
    }

    pub(super) fn on_command_timeout(
        &mut self,
        pane: PaneId,
        instance: u64,
        line: &LineId,
    ) -> Vec<Effect> {
        let Some(p) = self.panes.get_mut(&pane) else {
            return Vec::new();
        };
        if p.instance != instance {
            log::debug!("[Terminal {pane}] Dropping timeout for previous pane instance");
            return Vec::new();
        }
        let still_pending = p
            .lines
            .get(line)
            .is_some_and(|l| l.status() == LineStatus::Pending);
        if still_pending {
            log::debug!("[Terminal {pane}] No output yet for {line}");
            p.lines.set_status(line, LineStatus::TimedOut);
            if p.command_status == LineStatus::Pending {
                p.command_status = LineStatus::TimedOut;
            }
        }
        Vec::new()
    }

    pub(super) fn on_send_failed(
        &mut self,
        pane: PaneId,
        generation: u64,
        line: Option<&LineId>,
        reason: &str,
    ) -> Vec<Effect> {
        let Some(p) = self.live_pane(pane, generation, "send failure") else {
            return Vec::new();
        };
        log::warn!("[Terminal {pane}] Send failed (generation {generation}): {reason}");
        let Some(line) = line else {
            return Vec::new();
        };
        p.lines.set_status(line, LineStatus::Error);
        p.lines
            .push_output("Failed to send command to terminal", LineStatus::Error);
        p.command_status = LineStatus::Error;
        Vec::new()
    }
}
