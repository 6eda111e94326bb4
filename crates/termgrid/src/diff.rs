// SPDX-License-Identifier: MIT
//
// Differential frame rendering.
//
// The Renderer owns the two cell grids: "back" (what the application wants
// on screen) and "front" (what we believe the terminal currently shows).
// `render` walks both row by row, emits escapes and characters only for
// cells that differ, then syncs front to back. A frame where nothing
// changed emits nothing at all.
//
// All emission goes through the OutputBuffer and is flushed to the sink
// exactly once per render call. The CellWriter's one-deep style cache and
// cursor-contiguity tracking persist across frames, matching the state the
// physical terminal carries between writes.

use std::io::{self, Write};

use tracing::trace;

use crate::ansi::{self, OutputMode};
use crate::buffer::CellGrid;
use crate::cell::Cell;
use crate::output::{CellWriter, OutputBuffer};

/// Statistics from a single render, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Cells that differed and were redrawn.
    pub cells_redrawn: usize,
    /// Bytes written to the sink.
    pub bytes_written: usize,
}

/// Cursor position sentinel: both coordinates negative means hidden.
const CURSOR_HIDDEN: (i32, i32) = (-1, -1);

/// Double-buffered differential renderer.
pub struct Renderer {
    back: CellGrid,
    front: CellGrid,
    output: OutputBuffer,
    writer: CellWriter,
    mode: OutputMode,
    clear_cell: Cell,
    /// Desired cursor position, `CURSOR_HIDDEN` when hidden.
    cursor: (i32, i32),
    /// Whether the terminal currently shows the cursor. Show/hide escapes
    /// are emitted only on transitions.
    cursor_visible: bool,
    /// Set when the physical screen content is unknown (after a resize or
    /// an explicit invalidation); forces a clear + full repaint.
    dirty_screen: bool,
}

impl Renderer {
    /// Create a renderer for a `width` x `height` terminal. Both grids
    /// start blank; the cursor starts hidden, matching the hide escape the
    /// screen setup writes.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            back: CellGrid::new(width, height, Cell::EMPTY),
            front: CellGrid::new(width, height, Cell::EMPTY),
            output: OutputBuffer::new(),
            writer: CellWriter::new(),
            mode: OutputMode::default(),
            clear_cell: Cell::EMPTY,
            cursor: CURSOR_HIDDEN,
            cursor_visible: false,
            dirty_screen: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.back.width()
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.back.height()
    }

    /// The back grid, for draw primitives.
    #[inline]
    pub fn back_mut(&mut self) -> &mut CellGrid {
        &mut self.back
    }

    #[inline]
    #[must_use]
    pub fn back(&self) -> &CellGrid {
        &self.back
    }

    /// The cell used for `clear` fills and resize-exposed regions.
    #[inline]
    #[must_use]
    pub const fn clear_cell(&self) -> Cell {
        self.clear_cell
    }

    /// Set the styles used by [`clear`](Self::clear) and for cells exposed
    /// by a resize.
    pub fn set_clear_cell(&mut self, cell: Cell) {
        self.clear_cell = cell;
    }

    /// Change how colors serialize. The stored grids are untouched, but
    /// the style cache is dropped so the next frame re-emits under the new
    /// encoding.
    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.mode = mode;
        self.writer.reset_state();
        self.front.clear(self.clear_cell);
        self.dirty_screen = true;
    }

    #[inline]
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        self.mode
    }

    /// Fill the back grid with the clear cell.
    pub fn clear(&mut self) {
        let fill = self.clear_cell;
        self.back.clear(fill);
    }

    /// Place the visible cursor. Takes effect at the next render.
    pub fn set_cursor(&mut self, x: u16, y: u16) {
        self.cursor = (i32::from(x), i32::from(y));
    }

    /// Hide the cursor. Takes effect at the next render.
    pub fn hide_cursor(&mut self) {
        self.cursor = CURSOR_HIDDEN;
    }

    /// Resize both grids to the new terminal dimensions. The back grid
    /// keeps the overlapping top-left rectangle of its contents; the front
    /// grid is invalidated outright, because after a physical resize the
    /// terminal's actual content is unknown and must be repainted.
    pub fn resize(&mut self, width: usize, height: usize) {
        let fill = self.clear_cell;
        self.back.resize(width, height, fill);
        self.front.resize(width, height, fill);
        self.front.clear(fill);
        self.writer.reset_state();
        self.dirty_screen = true;
        trace!(width, height, "grids resized");
    }

    /// Diff back against front, write the minimal update to `sink`, and
    /// sync front to back.
    ///
    /// # Errors
    ///
    /// Propagates write failures from the sink; the front grid keeps
    /// whatever state was synced before the failure.
    pub fn render(&mut self, sink: &mut impl Write) -> io::Result<RenderStats> {
        if self.dirty_screen {
            // Unknown screen content: clear it in the clear style and
            // repaint everything. Clearing with the style set means cells
            // that equal the clear cell need no redraw afterwards.
            ansi::style_pair(
                &mut self.output,
                self.clear_cell.fg,
                self.clear_cell.bg,
                self.mode,
            )
            .ok();
            ansi::clear_screen(&mut self.output).ok();
            self.front.clear(self.clear_cell);
            self.writer.reset_state();
            self.dirty_screen = false;
        }

        let mut stats = RenderStats::default();
        let width = self.back.width();
        let height = self.back.height();

        for y in 0..height {
            let mut x = 0;
            while x < width {
                let Some(cell) = self.back.get(x, y) else { break };
                let mut w = cell.width();
                let mut emit = cell;

                // A wide character that would straddle the right edge is
                // painted as a padding space so the glyph never corrupts
                // the next row.
                if w == 2 && x + 1 >= width {
                    emit = Cell::blank(cell.fg, cell.bg);
                    w = 1;
                }

                if self.front.get(x, y) == Some(emit) {
                    x += w;
                    continue;
                }

                #[allow(clippy::cast_possible_truncation)] // grid dims come from u16 winsize
                self.writer.render_cell(
                    &mut self.output,
                    x as u16,
                    y as u16,
                    emit,
                    w as u16,
                    self.mode,
                );
                self.front.put(x, y, emit);
                if w == 2 {
                    // The terminal drew both columns; keep front in sync.
                    self.front.put(x + 1, y, Cell::blank(emit.fg, emit.bg));
                }
                stats.cells_redrawn += 1;
                x += w;
            }
        }

        self.sync_cursor();

        stats.bytes_written = self.output.len();
        self.output.flush_to(sink)?;
        trace!(
            cells = stats.cells_redrawn,
            bytes = stats.bytes_written,
            "frame rendered"
        );
        Ok(stats)
    }

    /// Emit cursor positioning and, on transitions only, show/hide.
    fn sync_cursor(&mut self) {
        let hidden = self.cursor == CURSOR_HIDDEN;
        if hidden {
            if self.cursor_visible {
                ansi::cursor_hide(&mut self.output).ok();
                self.cursor_visible = false;
            }
            return;
        }

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let (cx, cy) = (self.cursor.0 as u16, self.cursor.1 as u16);
        if !self.cursor_visible {
            ansi::cursor_show(&mut self.output).ok();
            self.cursor_visible = true;
        }
        ansi::cursor_to(&mut self.output, cx, cy).ok();
        // The terminal cursor moved; the writer's contiguity tracking must
        // follow or the next frame would skip a needed cursor move.
        self.writer.reset_state();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
