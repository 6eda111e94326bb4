// SPDX-License-Identifier: MIT
//
// CellGrid: a 2D grid of cells in row-major order.
//
// Two of these exist per screen: the back grid (what the application wants
// drawn) and the front grid (what is believed to be on the physical
// terminal). The renderer diffs them and syncs front to back.
//
// Out-of-range writes are silently ignored. Draw code paints freely near
// edges without bounds-checking every call; clipping happens here, once.

use unicode_segmentation::UnicodeSegmentation;

use crate::cell::{Cell, Style};

/// A row-major grid of [`Cell`]s with silent-clip writes and
/// overlap-preserving resize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl CellGrid {
    /// Create a grid filled with `fill`.
    #[must_use]
    pub fn new(width: usize, height: usize, fill: Cell) -> Self {
        Self {
            width,
            height,
            cells: vec![fill; width * height],
        }
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[inline]
    const fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Read the cell at `(x, y)`, or `None` if out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        if x < self.width && y < self.height {
            Some(self.cells[self.idx(x, y)])
        } else {
            None
        }
    }

    /// Write the cell at `(x, y)`. Out-of-range coordinates are ignored.
    #[inline]
    pub fn put(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            let i = self.idx(x, y);
            self.cells[i] = cell;
        }
    }

    /// Paint a string starting at `(x, y)`, clipped to the row. Wide
    /// graphemes occupy two columns: the head cell holds the codepoint and
    /// the following column is filled with a styled blank continuation.
    /// A wide grapheme that would straddle the right edge is painted as a
    /// single blank instead.
    ///
    /// Returns the number of grapheme clusters painted.
    pub fn put_str(&mut self, x: usize, y: usize, fg: Style, bg: Style, text: &str) -> usize {
        if y >= self.height {
            return 0;
        }
        let mut col = x;
        let mut painted = 0;
        for g in text.graphemes(true) {
            if col >= self.width {
                break;
            }
            // First scalar of the cluster is what we store; a cell holds
            // one codepoint.
            let Some(ch) = g.chars().next() else { break };
            let cell = Cell::new(ch, fg, bg);
            let w = cell.width();
            if w == 2 {
                if col + 1 >= self.width {
                    self.put(col, y, Cell::blank(fg, bg));
                    col += 1;
                    painted += 1;
                    continue;
                }
                self.put(col, y, cell);
                self.put(col + 1, y, Cell::blank(fg, bg));
            } else {
                self.put(col, y, cell);
            }
            col += w;
            painted += 1;
        }
        painted
    }

    /// Copy a rectangular region of cells into the grid, row by row.
    /// `src` is read row-major as `w * h` cells; parts of the rectangle
    /// falling outside the grid are clipped.
    pub fn blit(&mut self, x: usize, y: usize, w: usize, h: usize, src: &[Cell]) {
        for row in 0..h {
            for col in 0..w {
                let Some(&cell) = src.get(row * w + col) else {
                    return;
                };
                self.put(x + col, y + row, cell);
            }
        }
    }

    /// Fill every cell with `fill`.
    pub fn clear(&mut self, fill: Cell) {
        self.cells.fill(fill);
    }

    /// Resize in place, preserving the overlapping top-left rectangle of
    /// the old contents and filling exposed cells with `fill`.
    pub fn resize(&mut self, width: usize, height: usize, fill: Cell) {
        if width == self.width && height == self.height {
            return;
        }
        let mut cells = vec![fill; width * height];
        let copy_w = self.width.min(width);
        let copy_h = self.height.min(height);
        for y in 0..copy_h {
            let src = y * self.width;
            let dst = y * width;
            cells[dst..dst + copy_w].copy_from_slice(&self.cells[src..src + copy_w]);
        }
        self.width = width;
        self.height = height;
        self.cells = cells;
    }

    /// Make this grid an exact copy of `other`, reusing the allocation
    /// when dimensions already match.
    pub fn copy_from(&mut self, other: &Self) {
        if self.width == other.width && self.height == other.height {
            self.cells.copy_from_slice(&other.cells);
        } else {
            self.width = other.width;
            self.height = other.height;
            self.cells.clear();
            self.cells.extend_from_slice(&other.cells);
        }
    }

    /// Raw cell slice, row-major.
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// One row of cells.
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[Cell] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Attr, Color};
    use pretty_assertions::assert_eq;

    fn grid(w: usize, h: usize) -> CellGrid {
        CellGrid::new(w, h, Cell::EMPTY)
    }

    fn styled(ch: char) -> Cell {
        Cell::new(ch, Style::new(Color::Red), Style::DEFAULT)
    }

    #[test]
    fn put_and_get_round_trip() {
        let mut g = grid(4, 3);
        g.put(2, 1, styled('x'));
        assert_eq!(g.get(2, 1), Some(styled('x')));
        assert_eq!(g.get(0, 0), Some(Cell::EMPTY));
    }

    #[test]
    fn out_of_range_put_is_ignored() {
        let mut g = grid(4, 3);
        g.put(4, 0, styled('x'));
        g.put(0, 3, styled('x'));
        g.put(100, 100, styled('x'));
        assert_eq!(g, grid(4, 3));
        assert_eq!(g.get(4, 0), None);
    }

    #[test]
    fn clear_fills_every_cell() {
        let mut g = grid(3, 2);
        g.put(1, 1, styled('q'));
        let fill = Cell::blank(Style::DEFAULT, Style::new(Color::Blue));
        g.clear(fill);
        assert!(g.cells().iter().all(|&c| c == fill));
    }

    #[test]
    fn grow_preserves_old_contents() {
        let mut g = grid(3, 2);
        g.put(0, 0, styled('a'));
        g.put(2, 1, styled('b'));
        g.resize(5, 4, Cell::EMPTY);
        assert_eq!(g.get(0, 0), Some(styled('a')));
        assert_eq!(g.get(2, 1), Some(styled('b')));
        assert_eq!(g.get(4, 3), Some(Cell::EMPTY));
    }

    #[test]
    fn shrink_preserves_top_left_rectangle() {
        let mut g = grid(5, 4);
        g.put(1, 1, styled('a'));
        g.put(4, 3, styled('z'));
        g.resize(2, 2, Cell::EMPTY);
        assert_eq!(g.width(), 2);
        assert_eq!(g.height(), 2);
        assert_eq!(g.get(1, 1), Some(styled('a')));
        assert_eq!(g.get(4, 3), None);
    }

    #[test]
    fn resize_exposed_cells_use_fill() {
        let mut g = grid(2, 2);
        let fill = Cell::blank(Style::new(Color::Green), Style::DEFAULT);
        g.resize(3, 2, fill);
        assert_eq!(g.get(2, 0), Some(fill));
        assert_eq!(g.get(2, 1), Some(fill));
    }

    #[test]
    fn put_str_advances_and_clips() {
        let mut g = grid(4, 1);
        let n = g.put_str(2, 0, Style::DEFAULT, Style::DEFAULT, "hello");
        assert_eq!(n, 2);
        assert_eq!(g.get(2, 0).map(Cell::display_char), Some('h'));
        assert_eq!(g.get(3, 0).map(Cell::display_char), Some('e'));
    }

    #[test]
    fn put_str_wide_char_writes_continuation() {
        let mut g = grid(4, 1);
        let n = g.put_str(0, 0, Style::DEFAULT, Style::DEFAULT, "漢a");
        assert_eq!(n, 2);
        assert_eq!(g.get(0, 0).map(Cell::display_char), Some('漢'));
        assert_eq!(g.get(1, 0).map(|c| c.ch), Some(0));
        assert_eq!(g.get(2, 0).map(Cell::display_char), Some('a'));
    }

    #[test]
    fn put_str_wide_char_at_edge_becomes_blank() {
        let mut g = grid(3, 1);
        let fg = Style::new(Color::Red).with(Attr::BOLD);
        g.put_str(2, 0, fg, Style::DEFAULT, "漢");
        let edge = g.get(2, 0).unwrap();
        assert_eq!(edge.ch, 0);
        assert_eq!(edge.fg, fg);
    }

    #[test]
    fn blit_copies_rectangle_with_clipping() {
        let mut g = grid(3, 3);
        let src = vec![styled('a'), styled('b'), styled('c'), styled('d')];
        g.blit(2, 2, 2, 2, &src);
        assert_eq!(g.get(2, 2), Some(styled('a')));
        // (3, 2) and (2, 3)+(3, 3) clip away
        assert_eq!(g.get(2, 0), Some(Cell::EMPTY));
    }

    #[test]
    fn copy_from_matches_source() {
        let mut a = grid(3, 2);
        a.put(1, 0, styled('k'));
        let mut b = grid(5, 5);
        b.copy_from(&a);
        assert_eq!(a, b);
    }
}
