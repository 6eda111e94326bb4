// SPDX-License-Identifier: MIT
//
// Output buffering and stateful cell rendering.
//
// Two components work together to minimize terminal I/O:
//
//   OutputBuffer accumulates all ANSI bytes in memory so the entire frame
//   can be written in a single write() syscall. This eliminates per-escape
//   overhead and keeps slow transports (SSH) responsive.
//
//   CellWriter tracks the terminal's current state (cursor position, last
//   emitted style pair) and skips redundant escape sequences. If the last
//   cell was red-on-black and the next cell is also red-on-black, we just
//   output the character, no SGR at all. If the next cell sits immediately
//   to the right of the last one, no cursor move either.

use std::io::{self, Write};

use crate::ansi::{self, OutputMode};
use crate::cell::{Cell, Style};

// ─── OutputBuffer ────────────────────────────────────────────────────────────

/// A byte buffer that accumulates ANSI output for a single `write()` syscall.
///
/// Instead of hundreds of small writes per frame (cursor moves, color
/// changes, characters), everything goes into this buffer first. A single
/// flush at frame end writes it all at once.
///
/// Default capacity: 16 KB, enough for most frames without reallocation.
pub struct OutputBuffer {
    buf: Vec<u8>,
}

const DEFAULT_CAPACITY: usize = 16_384;

impl OutputBuffer {
    /// Create an empty buffer with default capacity (16 KB).
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Number of bytes accumulated.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The accumulated bytes (for testing and debugging).
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Write a cell codepoint as UTF-8.
    ///
    /// A codepoint of 0 is a blank cell and renders as a space; invalid
    /// scalar values also degrade to a space rather than emitting raw bytes.
    pub fn write_codepoint(&mut self, cp: u32) {
        if cp == 0 {
            self.buf.push(b' ');
            return;
        }
        match char::from_u32(cp) {
            Some(ch) => {
                let mut enc = [0u8; 4];
                let s = ch.encode_utf8(&mut enc);
                self.buf.extend_from_slice(s.as_bytes());
            }
            None => self.buf.push(b' '),
        }
    }

    /// Clear the buffer for reuse (keeps allocated capacity).
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write accumulated output to an arbitrary writer and clear the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn flush_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        if !self.buf.is_empty() {
            w.write_all(&self.buf)?;
            w.flush()?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Intentionally a no-op. Real flushing via flush_to().
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── CellWriter ──────────────────────────────────────────────────────────────

/// Stateful cell renderer that tracks terminal state to skip redundant
/// escapes.
///
/// # Optimization decisions
///
/// - **Cursor**: skipped when the next cell starts at `(last_x + 1, last_y)`,
///   since the terminal auto-advances after character output. A wide
///   character advances the tracked position by two columns.
/// - **Style**: a one-deep cache of the last emitted `(fg, bg)` pair. On
///   change, emit SGR 0 then the full new style; on match, emit nothing.
///   Resetting first means no per-attribute "off" codes are ever needed.
pub struct CellWriter {
    last_x: i32,
    last_y: i32,
    last_style: Option<(Style, Style)>,
}

impl CellWriter {
    /// Create a writer with no tracked state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_x: -1,
            last_y: -1,
            last_style: None,
        }
    }

    /// Reset all tracked state. Call after a terminal reset, screen clear,
    /// or anything else that touches the terminal behind our back.
    #[allow(clippy::missing_const_for_fn)] // *self = Self::new() isn't const-evaluable.
    pub fn reset_state(&mut self) {
        *self = Self::new();
    }

    /// Render a single cell, emitting only the escape sequences needed.
    ///
    /// `width` is the cell's column width (1 or 2) as decided by the
    /// caller's fit policy; it controls how far the tracked cursor
    /// position advances.
    pub fn render_cell(
        &mut self,
        out: &mut OutputBuffer,
        x: u16,
        y: u16,
        cell: Cell,
        width: u16,
        mode: OutputMode,
    ) {
        let xi = i32::from(x);
        let yi = i32::from(y);

        // Skip the cursor move if the terminal cursor is already here
        // (the previous write ended at the column to our left).
        if yi != self.last_y || xi != self.last_x + 1 {
            ansi::cursor_to(out, x, y).ok();
        }

        if self.last_style != Some((cell.fg, cell.bg)) {
            ansi::style_pair(out, cell.fg, cell.bg, mode).ok();
            self.last_style = Some((cell.fg, cell.bg));
        }

        out.write_codepoint(cell.ch);

        self.last_x = xi + i32::from(width) - 1;
        self.last_y = yi;
    }
}

impl Default for CellWriter {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Attr, Color};
    use pretty_assertions::assert_eq;

    // ── OutputBuffer ────────────────────────────────────────────────────

    #[test]
    fn output_buffer_new_is_empty() {
        let buf = OutputBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn output_buffer_write_trait() {
        let mut buf = OutputBuffer::new();
        write!(buf, "hello {}", 42).unwrap();
        assert_eq!(buf.as_bytes(), b"hello 42");
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn output_buffer_write_codepoint_ascii() {
        let mut buf = OutputBuffer::new();
        buf.write_codepoint(u32::from('A'));
        assert_eq!(buf.as_bytes(), b"A");
    }

    #[test]
    fn output_buffer_write_codepoint_unicode() {
        let mut buf = OutputBuffer::new();
        buf.write_codepoint(u32::from('中'));
        assert_eq!(buf.as_bytes(), "中".as_bytes());
    }

    #[test]
    fn output_buffer_blank_renders_space() {
        let mut buf = OutputBuffer::new();
        buf.write_codepoint(0);
        assert_eq!(buf.as_bytes(), b" ");
    }

    #[test]
    fn output_buffer_invalid_codepoint_renders_space() {
        let mut buf = OutputBuffer::new();
        buf.write_codepoint(0xD800); // surrogate, not a scalar value
        assert_eq!(buf.as_bytes(), b" ");
    }

    #[test]
    fn output_buffer_flush_to_clears() {
        let mut buf = OutputBuffer::new();
        write!(buf, "frame data").unwrap();

        let mut dest = Vec::new();
        buf.flush_to(&mut dest).unwrap();

        assert_eq!(dest, b"frame data");
        assert!(buf.is_empty());
    }

    #[test]
    fn output_buffer_flush_to_empty_is_noop() {
        let mut buf = OutputBuffer::new();
        let mut dest = Vec::new();
        buf.flush_to(&mut dest).unwrap();
        assert!(dest.is_empty());
    }

    // ── CellWriter helpers ──────────────────────────────────────────────

    fn plain(ch: char) -> Cell {
        Cell::new(ch, Style::DEFAULT, Style::DEFAULT)
    }

    fn red(ch: char) -> Cell {
        Cell::new(ch, Style::new(Color::Red), Style::DEFAULT)
    }

    /// Render a sequence of cells and return the output as a string.
    fn render_seq(cells: &[(u16, u16, Cell)]) -> String {
        let mut out = OutputBuffer::new();
        let mut writer = CellWriter::new();
        for &(x, y, cell) in cells {
            let w = u16::try_from(cell.width()).unwrap();
            writer.render_cell(&mut out, x, y, cell, w, OutputMode::Normal);
        }
        String::from_utf8(out.as_bytes().to_vec()).unwrap()
    }

    // ── CellWriter cursor ─────────────────────────────────────────────

    #[test]
    fn first_cell_emits_cursor_move() {
        let output = render_seq(&[(5, 3, plain('A'))]);
        assert!(output.contains("\x1b[4;6H"));
        assert!(output.contains('A'));
    }

    #[test]
    fn sequential_cells_skip_cursor_move() {
        let output = render_seq(&[
            (0, 0, plain('A')),
            (1, 0, plain('B')),
            (2, 0, plain('C')),
        ]);
        // Only the first cell gets a cursor move; the run is contiguous.
        assert_eq!(output.matches('H').count(), 1);
        assert!(output.contains("ABC"));
    }

    #[test]
    fn gap_emits_cursor_move() {
        let output = render_seq(&[(0, 0, plain('A')), (5, 0, plain('B'))]);
        assert_eq!(output.matches('H').count(), 2);
    }

    #[test]
    fn new_row_emits_cursor_move() {
        let output = render_seq(&[(0, 0, plain('A')), (0, 1, plain('B'))]);
        assert_eq!(output.matches('H').count(), 2);
    }

    #[test]
    fn wide_char_advances_two_columns() {
        // After 漢 at column 0 the terminal cursor sits at column 2, so a
        // cell at (2, 0) is contiguous and needs no cursor move.
        let output = render_seq(&[(0, 0, plain('漢')), (2, 0, plain('a'))]);
        assert_eq!(output.matches('H').count(), 1);
    }

    // ── CellWriter styles ─────────────────────────────────────────────

    #[test]
    fn first_cell_emits_full_style() {
        let output = render_seq(&[(0, 0, red('A'))]);
        assert!(output.contains("\x1b[m"));
        assert!(output.contains("\x1b[31m"));
    }

    #[test]
    fn same_style_not_re_emitted() {
        let output = render_seq(&[(0, 0, red('A')), (1, 0, red('B'))]);
        assert_eq!(output.matches("\x1b[31m").count(), 1);
    }

    #[test]
    fn style_change_resets_then_reemits() {
        let bold_green = Cell::new('B', Style::new(Color::Green).with(Attr::BOLD), Style::DEFAULT);
        let output = render_seq(&[(0, 0, red('A')), (1, 0, bold_green)]);
        assert_eq!(output.matches("\x1b[m").count(), 2);
        assert!(output.contains("\x1b[1m"));
        assert!(output.contains("\x1b[32m"));
    }

    #[test]
    fn reset_state_forces_full_re_emit() {
        let mut out = OutputBuffer::new();
        let mut writer = CellWriter::new();
        writer.render_cell(&mut out, 0, 0, red('A'), 1, OutputMode::Normal);
        writer.reset_state();
        writer.render_cell(&mut out, 1, 0, red('B'), 1, OutputMode::Normal);
        let output = String::from_utf8(out.as_bytes().to_vec()).unwrap();
        // Both cells emit the style and the second re-emits the cursor too.
        assert_eq!(output.matches("\x1b[31m").count(), 2);
        assert_eq!(output.matches('H').count(), 2);
    }
}
