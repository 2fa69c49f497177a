//! Per-pane output buffer.
//!
//! A [`LineBuffer`] is an append-only sequence of [`Line`]s. Lines are never
//! removed individually; the whole buffer is cleared at once by the local
//! `clear` command. The only mutation allowed on an appended line is a
//! status transition on command lines.
//!
//! Line ids have the form `{pane}-{epoch}-{counter}`. `counter` restarts at
//! zero after a clear, `epoch` never goes back, so an id minted after a
//! clear can never collide with one minted before it.

use serde::Serialize;

use super::pane::PaneId;

/// Status dot shown next to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Completed (blue).
    Success,
    /// Failed (red).
    Error,
    /// Submitted, no output seen yet (yellow).
    Pending,
    /// Soft timeout elapsed with no output; still running.
    TimedOut,
    /// Plain output, no indicator.
    #[default]
    None,
}

impl LineStatus {
    /// Whether a command line in this status is still awaiting output.
    #[must_use]
    pub fn is_unresolved(self) -> bool {
        matches!(self, Self::Pending | Self::TimedOut)
    }
}

/// Pane-scoped line identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LineId(String);

impl LineId {
    /// Id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One rendered row: a submitted command or a chunk of backend output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    id: LineId,
    content: String,
    is_command: bool,
    status: LineStatus,
}

impl Line {
    /// Unique id within the owning pane.
    pub fn id(&self) -> &LineId {
        &self.id
    }

    /// Literal command text or sanitized output.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// `true` for lines typed by the user.
    pub fn is_command(&self) -> bool {
        self.is_command
    }

    /// Current status indicator.
    pub fn status(&self) -> LineStatus {
        self.status
    }
}

/// Append-only line storage for one pane.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    pane: PaneId,
    lines: Vec<Line>,
    counter: u64,
    epoch: u32,
}

impl LineBuffer {
    /// Empty buffer minting ids for `pane`.
    pub fn new(pane: PaneId) -> Self {
        Self {
            pane,
            lines: Vec::new(),
            counter: 0,
            epoch: 0,
        }
    }

    /// All lines in append order.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// `true` when no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines appended since the last [`clear`](Self::clear).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Most recently appended line.
    pub fn last(&self) -> Option<&Line> {
        self.lines.last()
    }

    /// Look up a line by id.
    pub fn get(&self, id: &LineId) -> Option<&Line> {
        self.lines.iter().rev().find(|line| &line.id == id)
    }

    /// Append a line and return its freshly minted id.
    pub fn push(&mut self, content: impl Into<String>, is_command: bool, status: LineStatus) -> LineId {
        self.counter += 1;
        let id = LineId(format!("{}-{}-{}", self.pane, self.epoch, self.counter));
        self.lines.push(Line {
            id: id.clone(),
            content: content.into(),
            is_command,
            status,
        });
        id
    }

    /// Append a command line in `Pending` state.
    pub fn push_command(&mut self, text: impl Into<String>) -> LineId {
        self.push(text, true, LineStatus::Pending)
    }

    /// Append an output/info line.
    pub fn push_output(&mut self, content: impl Into<String>, status: LineStatus) -> LineId {
        self.push(content, false, status)
    }

    /// Change the status of a line. Returns `false` if the id is unknown.
    pub fn set_status(&mut self, id: &LineId, status: LineStatus) -> bool {
        match self.lines.iter_mut().rev().find(|line| &line.id == id) {
            Some(line) => {
                line.status = status;
                true
            }
            None => false,
        }
    }

    /// Resolve every unresolved command line to `Success`.
    ///
    /// Output is not framed per command, so any output counts as completion
    /// for everything still waiting. Returns how many lines changed.
    pub fn resolve_pending(&mut self) -> usize {
        let mut resolved = 0;
        for line in self
            .lines
            .iter_mut()
            .filter(|line| line.is_command && line.status.is_unresolved())
        {
            line.status = LineStatus::Success;
            resolved += 1;
        }
        resolved
    }

    /// Drop every line and restart the counter.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.counter = 0;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn push_mints_sequential_ids() {
        let mut buf = LineBuffer::new(PaneId::Left);
        let a = buf.push_output("a", LineStatus::None);
        let b = buf.push_output("b", LineStatus::None);
        assert_eq!(a.as_str(), "left-0-1");
        assert_eq!(b.as_str(), "left-0-2");
        assert_eq!(buf.counter(), 2);
    }

    #[test]
    fn ids_stay_unique_across_clears() {
        let mut buf = LineBuffer::new(PaneId::Right);
        let mut seen = HashSet::new();
        for round in 0..4 {
            for i in 0..10 {
                let id = buf.push_output(format!("{round}:{i}"), LineStatus::None);
                assert!(seen.insert(id), "duplicate id in round {round}");
            }
            buf.clear();
            assert_eq!(buf.counter(), 0);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn set_status_only_touches_target() {
        let mut buf = LineBuffer::new(PaneId::Left);
        let first = buf.push_command("ls");
        let second = buf.push_command("pwd");
        assert!(buf.set_status(&first, LineStatus::Error));
        assert_eq!(buf.get(&first).unwrap().status(), LineStatus::Error);
        assert_eq!(buf.get(&second).unwrap().status(), LineStatus::Pending);
    }

    #[test]
    fn set_status_unknown_id_is_false() {
        let mut buf = LineBuffer::new(PaneId::Left);
        let id = buf.push_command("ls");
        buf.clear();
        assert!(!buf.set_status(&id, LineStatus::Success));
    }

    #[test]
    fn resolve_pending_covers_timed_out_commands_only() {
        let mut buf = LineBuffer::new(PaneId::Left);
        let a = buf.push_command("sleep 5");
        buf.set_status(&a, LineStatus::TimedOut);
        let b = buf.push_command("echo hi");
        let out = buf.push_output("hi", LineStatus::None);
        let failed = buf.push_command("bad");
        buf.set_status(&failed, LineStatus::Error);

        assert_eq!(buf.resolve_pending(), 2);
        assert_eq!(buf.get(&a).unwrap().status(), LineStatus::Success);
        assert_eq!(buf.get(&b).unwrap().status(), LineStatus::Success);
        assert_eq!(buf.get(&out).unwrap().status(), LineStatus::None);
        assert_eq!(buf.get(&failed).unwrap().status(), LineStatus::Error);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&LineStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
