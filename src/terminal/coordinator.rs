//! Pane table transitions: split/unsplit, focus, resize and teardown.

use super::pane::{Pane, PaneConnection, PaneId};
use super::protocol::OutboundFrame;
use super::{Effect, Terminal};
use crate::constants;

impl Terminal {
    /// Toggle split view.
    ///
    /// Unsplit: creates the `right` pane with an empty buffer and starts
    /// connecting it. Split: closes the `right` pane's session, removes
    /// the pane and moves focus back to `left`.
    pub fn split_terminal(&mut self) -> Vec<Effect> {
        if self.is_split() {
            log::info!("[Terminal right] Closing split pane");
            return self.close_pane(PaneId::Right);
        }
        let instance = self.next_serial();
        self.panes
            .insert(PaneId::Right, Pane::new(PaneId::Right, instance));
        log::info!("[Terminal right] Split pane created");
        self.connect(PaneId::Right)
    }

    /// Focus `pane`. Returns `false` if it does not exist.
    pub fn set_active_pane(&mut self, pane: PaneId) -> bool {
        if !self.panes.contains_key(&pane) {
            return false;
        }
        self.active = pane;
        true
    }

    /// Focused pane; the target of keyboard input and resize events.
    pub fn active_pane(&self) -> PaneId {
        self.active
    }

    /// Record new character dimensions and forward them if connected.
    ///
    /// Dimensions below the minimum and unchanged dimensions are ignored.
    pub fn resize(&mut self, pane: PaneId, rows: u16, cols: u16) -> Vec<Effect> {
        if rows < constants::MIN_ROWS || cols < constants::MIN_COLS {
            log::debug!("[Terminal {pane}] Ignoring resize to {rows}x{cols}");
            return Vec::new();
        }
        let format = self.settings.wire_format;
        let Some(p) = self.panes.get_mut(&pane) else {
            return Vec::new();
        };
        if p.dims == Some((rows, cols)) {
            return Vec::new();
        }
        p.dims = Some((rows, cols));
        if !p.connection.is_connected() {
            return Vec::new();
        }
        log::debug!("[Terminal {pane}] Resize to {rows}x{cols}");
        vec![Effect::Send {
            pane,
            generation: p.generation,
            payload: OutboundFrame::Resize { rows, cols }.encode(format),
            line: None,
        }]
    }

    /// Resize from container pixel size using the fixed cell metrics.
    pub fn resize_pixels(&mut self, pane: PaneId, width: f64, height: f64) -> Vec<Effect> {
        let (Some(cols), Some(rows)) = (
            cells(width, self.settings.cell_width_px),
            cells(height, self.settings.cell_height_px),
        ) else {
            log::debug!("[Terminal {pane}] Ignoring pixel resize {width}x{height}");
            return Vec::new();
        };
        self.resize(pane, rows, cols)
    }

    /// Tear down `pane`'s connection. The `right` pane is also removed.
    ///
    /// Any socket is closed and the generation moves on, so callbacks
    /// still in flight for the old connection are dropped.
    pub fn close_pane(&mut self, pane: PaneId) -> Vec<Effect> {
        let effects = self.teardown(pane);
        if pane == PaneId::Right && self.panes.remove(&PaneId::Right).is_some() {
            self.active = PaneId::Left;
        }
        effects
    }

    /// Tear down every pane's connection.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let ids: Vec<PaneId> = self.panes.keys().copied().collect();
        ids.into_iter().flat_map(|id| self.teardown(id)).collect()
    }

    fn teardown(&mut self, pane: PaneId) -> Vec<Effect> {
        let generation = self.next_serial();
        let Some(p) = self.panes.get_mut(&pane) else {
            return Vec::new();
        };
        let previous = std::mem::replace(&mut p.generation, generation);
        let had_socket = p.connection.has_socket();
        p.connection = PaneConnection::Idle;
        p.retry_count = 0;
        if had_socket {
            log::info!("[Terminal {pane}] Closing socket");
            vec![Effect::CloseSocket {
                pane,
                generation: previous,
            }]
        } else {
            Vec::new()
        }
    }
}

/// Whole cells that fit in `px`, or `None` for unusable input.
fn cells(px: f64, cell: f64) -> Option<u16> {
    if !px.is_finite() || !cell.is_finite() || px <= 0.0 || cell <= 0.0 {
        return None;
    }
    let n = (px / cell).floor().min(f64::from(u16::MAX));
    Some(n as u16)
}
