// SPDX-License-Identifier: MIT
//
// Cell: the atomic unit of terminal rendering.
//
// Every character position on screen is a Cell: a Unicode codepoint plus a
// foreground and a background style. The entire pipeline exists to produce,
// diff, and output these.
//
// A style is an explicit `{color, attrs}` pair. Colors are mutually
// exclusive enumerants; only attributes combine, and the type system
// enforces that. A codepoint of 0 means "blank", rendered as a space.
//
// Wide characters (CJK, some emoji) occupy two columns. The first cell
// holds the codepoint; the column to its right is never written separately
// by the renderer, which skips it during the diff walk.

use unicode_width::UnicodeWidthChar;

// ─── Text Attributes ─────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Text attributes stored as a compact bitfield.
    ///
    /// These map directly to SGR (Select Graphic Rendition) parameters.
    /// Combine with bitwise OR:
    ///
    /// ```
    /// use termgrid::cell::Attr;
    ///
    /// let style = Attr::BOLD | Attr::UNDERLINE;
    /// assert!(style.contains(Attr::BOLD));
    /// assert!(!style.contains(Attr::REVERSE));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Attr: u8 {
        /// SGR 1, increased intensity.
        const BOLD      = 1 << 0;
        /// SGR 4, underline.
        const UNDERLINE = 1 << 1;
        /// SGR 7, swap foreground and background.
        const REVERSE   = 1 << 2;
    }
}

// ─── Color ───────────────────────────────────────────────────────────────────

/// A cell color: the terminal default, one of the eight base ANSI colors,
/// a palette index, or a 24-bit RGB value.
///
/// Variants are mutually exclusive by construction. How an [`Indexed`]
/// value is serialized depends on the active output mode (direct
/// 256-palette, 216-cube, or grayscale-ramp interpretation); the stored
/// cell never changes meaning when the output mode changes.
///
/// [`Indexed`]: Color::Indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Color {
    /// The terminal's configured default for this plane (SGR 39/49).
    #[default]
    Default,
    /// ANSI color 0.
    Black,
    /// ANSI color 1.
    Red,
    /// ANSI color 2.
    Green,
    /// ANSI color 3.
    Yellow,
    /// ANSI color 4.
    Blue,
    /// ANSI color 5.
    Magenta,
    /// ANSI color 6.
    Cyan,
    /// ANSI color 7.
    White,
    /// A palette index, interpreted per the active output mode.
    Indexed(u8),
    /// 24-bit direct color. Requires the truecolor output mode; other
    /// modes fall back to the default color rather than guessing.
    Rgb(u8, u8, u8),
}

impl Color {
    /// The ANSI base index (0-7) for the named colors, `None` otherwise.
    #[inline]
    #[must_use]
    pub const fn ansi_index(self) -> Option<u8> {
        match self {
            Self::Black => Some(0),
            Self::Red => Some(1),
            Self::Green => Some(2),
            Self::Yellow => Some(3),
            Self::Blue => Some(4),
            Self::Magenta => Some(5),
            Self::Cyan => Some(6),
            Self::White => Some(7),
            _ => None,
        }
    }
}

// ─── Style ───────────────────────────────────────────────────────────────────

/// One plane of a cell's appearance: a color plus attribute flags.
///
/// Both the foreground and the background carry a full `Style`, mirroring
/// how terminals accept attributes alongside either SGR color parameter.
/// In practice BOLD/UNDERLINE only make sense on the foreground and the
/// renderer unions both planes' attributes when emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Style {
    pub color: Color,
    pub attrs: Attr,
}

impl Style {
    /// Default color, no attributes.
    pub const DEFAULT: Self = Self {
        color: Color::Default,
        attrs: Attr::empty(),
    };

    #[inline]
    #[must_use]
    pub const fn new(color: Color) -> Self {
        Self {
            color,
            attrs: Attr::empty(),
        }
    }

    /// Add attribute flags, builder-style.
    #[inline]
    #[must_use]
    pub const fn with(mut self, attrs: Attr) -> Self {
        self.attrs = self.attrs.union(attrs);
        self
    }
}

impl From<Color> for Style {
    #[inline]
    fn from(color: Color) -> Self {
        Self::new(color)
    }
}

// ─── Cell ────────────────────────────────────────────────────────────────────

/// A single terminal cell, the atom of rendering.
///
/// Holds a Unicode scalar value as `u32` (0 = blank, rendered as a space)
/// and the foreground/background styles. `Copy` and 12 bytes, so grids of
/// these are cheap to clone and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Unicode scalar value, or 0 for a blank cell.
    pub ch: u32,
    /// Foreground style.
    pub fg: Style,
    /// Background style.
    pub bg: Style,
}

impl Cell {
    /// A blank cell with default styles. What `clear()` fills with when no
    /// clear style has been configured.
    pub const EMPTY: Self = Self {
        ch: 0,
        fg: Style::DEFAULT,
        bg: Style::DEFAULT,
    };

    /// Create a cell from a character and styles.
    #[inline]
    #[must_use]
    pub fn new(ch: char, fg: Style, bg: Style) -> Self {
        Self {
            ch: ch as u32,
            fg,
            bg,
        }
    }

    /// A blank cell carrying the given styles. Used for clear fills and
    /// for the padding written in place of wide characters that don't fit.
    #[inline]
    #[must_use]
    pub const fn blank(fg: Style, bg: Style) -> Self {
        Self { ch: 0, fg, bg }
    }

    /// Whether this cell renders as a space.
    #[inline]
    #[must_use]
    pub const fn is_blank(self) -> bool {
        self.ch == 0 || self.ch == ' ' as u32
    }

    /// The character this cell displays. Blank cells display a space;
    /// invalid scalar values (which `put` never stores, but a `u32` field
    /// cannot rule out) also degrade to a space.
    #[inline]
    #[must_use]
    pub fn display_char(self) -> char {
        if self.ch == 0 {
            ' '
        } else {
            char::from_u32(self.ch).unwrap_or(' ')
        }
    }

    /// Terminal column width of this cell's character: 1 for most, 2 for
    /// wide (CJK etc.), 1 for blanks and control characters.
    #[inline]
    #[must_use]
    pub fn width(self) -> usize {
        match char::from_u32(self.ch) {
            Some(c) if self.ch != 0 => UnicodeWidthChar::width(c).unwrap_or(1).max(1),
            _ => 1,
        }
    }
}

impl Default for Cell {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_cell_is_blank_with_default_styles() {
        assert!(Cell::EMPTY.is_blank());
        assert_eq!(Cell::EMPTY.fg, Style::DEFAULT);
        assert_eq!(Cell::EMPTY.bg, Style::DEFAULT);
        assert_eq!(Cell::EMPTY.display_char(), ' ');
    }

    #[test]
    fn space_counts_as_blank() {
        let c = Cell::new(' ', Style::DEFAULT, Style::DEFAULT);
        assert!(c.is_blank());
    }

    #[test]
    fn narrow_and_wide_widths() {
        let narrow = Cell::new('a', Style::DEFAULT, Style::DEFAULT);
        let wide = Cell::new('漢', Style::DEFAULT, Style::DEFAULT);
        assert_eq!(narrow.width(), 1);
        assert_eq!(wide.width(), 2);
        assert_eq!(Cell::EMPTY.width(), 1);
    }

    #[test]
    fn style_builder_accumulates_attrs() {
        let s = Style::new(Color::Red).with(Attr::BOLD).with(Attr::UNDERLINE);
        assert_eq!(s.color, Color::Red);
        assert!(s.attrs.contains(Attr::BOLD | Attr::UNDERLINE));
        assert!(!s.attrs.contains(Attr::REVERSE));
    }

    #[test]
    fn colors_are_distinct_enumerants() {
        assert_ne!(Color::Red, Color::Indexed(1));
        assert_ne!(Color::Default, Color::Black);
        assert_eq!(Color::Red.ansi_index(), Some(1));
        assert_eq!(Color::Indexed(9).ansi_index(), None);
    }

    #[test]
    fn display_char_degrades_invalid_scalar_to_space() {
        let c = Cell {
            ch: 0xD800, // surrogate, not a scalar value
            fg: Style::DEFAULT,
            bg: Style::DEFAULT,
        };
        assert_eq!(c.display_char(), ' ');
    }
}
