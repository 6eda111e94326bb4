// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No state,
// no decisions about when to emit; that's the `CellWriter`'s job. This
// module just knows the byte-level encoding of every terminal command we
// need.
//
// All cursor positions are 0-indexed in our API and converted to 1-indexed
// for the terminal (ANSI standard uses 1-based coordinates).
//
// All functions return `io::Result` propagated from the underlying writer.
// In practice they never fail when writing to `OutputBuffer` (backed by a Vec).

use std::io::{self, Write};

use crate::cell::{Attr, Color, Style};

// ─── Output Mode ─────────────────────────────────────────────────────────────

/// How indexed and RGB colors are serialized into SGR parameters.
///
/// Changing the mode changes the bytes emitted for a [`Color`], never the
/// stored cell. The named ANSI colors always use the compact 30-37/40-47
/// codes; [`Color::Indexed`] is reinterpreted per mode and
/// [`Color::Rgb`] only renders in [`Truecolor`](OutputMode::Truecolor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// 16-color terminals: indexed values 0-7 map to the base codes,
    /// 8-15 to the bright codes, anything higher to the default color.
    #[default]
    Normal,
    /// Full 256-color palette via `38;5;N` / `48;5;N`.
    Color256,
    /// The 6x6x6 color cube only: indices 0-215, offset by 16 into the
    /// 256-color palette on the wire.
    Color216,
    /// The grayscale ramp only: indices 0-23, offset by 232 on the wire.
    Grayscale,
    /// 24-bit direct color via `38;2;R;G;B` / `48;2;R;G;B`.
    Truecolor,
}

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor to `(x, y)` using the CUP (Cursor Position) sequence.
///
/// Our coordinates are 0-indexed; ANSI CUP is 1-indexed.
#[inline]
pub fn cursor_to(w: &mut impl Write, x: u16, y: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", y + 1, x + 1)
}

/// Hide the cursor (DECTCEM reset).
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// Show the cursor (DECTCEM set).
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// Clear the entire screen (ED 2).
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// Reset all SGR attributes to terminal defaults (SGR 0).
///
/// This clears everything: bold, colors, underline, reverse. The stateful
/// renderer must invalidate its tracked style after calling this.
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[m")
}

/// Switch to the alternate screen buffer (smcup).
#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

/// Return to the normal screen buffer (rmcup).
#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

/// Application keypad mode (DECCKM + DECKPAM), so arrows and the keypad
/// send the SS3 sequences our decoder tables expect.
#[inline]
pub fn enter_keypad(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1h\x1b=")
}

/// Leave application keypad mode.
#[inline]
pub fn exit_keypad(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1l\x1b>")
}

// ─── Mouse ───────────────────────────────────────────────────────────────────

/// Enable mouse reporting: button events (1000), drag motion (1002), and
/// both extended coordinate encodings (urxvt 1015, SGR 1006). Terminals
/// ignore the modes they don't support, so enabling all four gets the
/// richest protocol each terminal offers.
#[inline]
pub fn enable_mouse(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1000h\x1b[?1002h\x1b[?1015h\x1b[?1006h")
}

/// Disable all mouse reporting modes enabled by [`enable_mouse`].
#[inline]
pub fn disable_mouse(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1006l\x1b[?1015l\x1b[?1002l\x1b[?1000l")
}

// ─── SGR Styles ──────────────────────────────────────────────────────────────

/// Emit SGR codes for text attributes as a single CSI sequence.
///
/// Multiple attributes are semicolon-separated: `\x1b[1;7m` for
/// bold + reverse. Does nothing if no attributes are set.
pub fn attrs(w: &mut impl Write, attr: Attr) -> io::Result<()> {
    if attr.is_empty() {
        return Ok(());
    }

    w.write_all(b"\x1b[")?;
    let mut first = true;

    macro_rules! emit {
        ($flag:expr, $code:expr) => {
            if attr.contains($flag) {
                if !first {
                    w.write_all(b";")?;
                }
                w.write_all($code)?;
                first = false;
            }
        };
    }

    emit!(Attr::BOLD, b"1");
    emit!(Attr::UNDERLINE, b"4");
    emit!(Attr::REVERSE, b"7");

    w.write_all(b"m")
}

/// Set the foreground (text) color under the given output mode.
///
/// The terminal default emits nothing: callers reset with SGR 0 before
/// re-emitting a style, so "default" is whatever the reset left behind.
pub fn fg(w: &mut impl Write, color: Color, mode: OutputMode) -> io::Result<()> {
    plane(w, color, mode, 30, b"38")
}

/// Set the background color under the given output mode.
pub fn bg(w: &mut impl Write, color: Color, mode: OutputMode) -> io::Result<()> {
    plane(w, color, mode, 40, b"48")
}

/// Shared fg/bg encoder. `base` is 30 or 40, `ext` the `38`/`48` extended
/// color introducer.
fn plane(
    w: &mut impl Write,
    color: Color,
    mode: OutputMode,
    base: u16,
    ext: &[u8],
) -> io::Result<()> {
    if let Some(idx) = color.ansi_index() {
        return write!(w, "\x1b[{}m", base + u16::from(idx));
    }
    match (color, mode) {
        (Color::Indexed(i), OutputMode::Normal) => {
            if i < 8 {
                write!(w, "\x1b[{}m", base + u16::from(i))
            } else if i < 16 {
                write!(w, "\x1b[{}m", base + 60 + u16::from(i - 8))
            } else {
                Ok(())
            }
        }
        (Color::Indexed(i), OutputMode::Color256 | OutputMode::Truecolor) => {
            w.write_all(b"\x1b[")?;
            w.write_all(ext)?;
            write!(w, ";5;{i}m")
        }
        (Color::Indexed(i), OutputMode::Color216) => {
            // 6x6x6 cube sits at palette offset 16
            if i < 216 {
                w.write_all(b"\x1b[")?;
                w.write_all(ext)?;
                write!(w, ";5;{}m", u16::from(i) + 16)
            } else {
                Ok(())
            }
        }
        (Color::Indexed(i), OutputMode::Grayscale) => {
            // grayscale ramp sits at palette offset 232
            if i < 24 {
                w.write_all(b"\x1b[")?;
                w.write_all(ext)?;
                write!(w, ";5;{}m", u16::from(i) + 232)
            } else {
                Ok(())
            }
        }
        (Color::Rgb(r, g, b), OutputMode::Truecolor) => {
            w.write_all(b"\x1b[")?;
            w.write_all(ext)?;
            write!(w, ";2;{r};{g};{b}m")
        }
        _ => Ok(()),
    }
}

/// Emit a full style change: SGR reset, then the union of both planes'
/// attributes, then foreground and background colors.
///
/// Resetting first means every style is emitted from a known baseline, so
/// attribute removal never needs per-attribute "off" codes.
pub fn style_pair(w: &mut impl Write, f: Style, b: Style, mode: OutputMode) -> io::Result<()> {
    reset(w)?;
    attrs(w, f.attrs | b.attrs)?;
    fg(w, f.color, mode)?;
    bg(w, b.color, mode)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Run an emitter against a fresh buffer and return the bytes as a
    /// string for easy comparison.
    fn emit(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn cursor_to_converts_to_one_indexed() {
        assert_eq!(emit(|w| cursor_to(w, 0, 0)), "\x1b[1;1H");
        assert_eq!(emit(|w| cursor_to(w, 7, 2)), "\x1b[3;8H");
    }

    #[test]
    fn cursor_visibility_sequences() {
        assert_eq!(emit(cursor_hide), "\x1b[?25l");
        assert_eq!(emit(cursor_show), "\x1b[?25h");
    }

    #[test]
    fn screen_sequences() {
        assert_eq!(emit(clear_screen), "\x1b[2J");
        assert_eq!(emit(reset), "\x1b[m");
        assert_eq!(emit(enter_alt_screen), "\x1b[?1049h");
        assert_eq!(emit(exit_alt_screen), "\x1b[?1049l");
    }

    #[test]
    fn mouse_enable_covers_all_protocols() {
        let s = emit(enable_mouse);
        assert!(s.contains("?1000h"));
        assert!(s.contains("?1002h"));
        assert!(s.contains("?1015h"));
        assert!(s.contains("?1006h"));
        assert!(emit(disable_mouse).contains("?1006l"));
    }

    #[test]
    fn attrs_empty_emits_nothing() {
        assert_eq!(emit(|w| attrs(w, Attr::empty())), "");
    }

    #[test]
    fn attrs_combine_with_semicolons() {
        assert_eq!(emit(|w| attrs(w, Attr::BOLD)), "\x1b[1m");
        assert_eq!(emit(|w| attrs(w, Attr::BOLD | Attr::REVERSE)), "\x1b[1;7m");
        assert_eq!(
            emit(|w| attrs(w, Attr::BOLD | Attr::UNDERLINE | Attr::REVERSE)),
            "\x1b[1;4;7m"
        );
    }

    #[test]
    fn named_colors_use_compact_codes_in_every_mode() {
        for mode in [
            OutputMode::Normal,
            OutputMode::Color256,
            OutputMode::Truecolor,
        ] {
            assert_eq!(emit(|w| fg(w, Color::Red, mode)), "\x1b[31m");
            assert_eq!(emit(|w| bg(w, Color::Blue, mode)), "\x1b[44m");
        }
    }

    #[test]
    fn default_color_emits_nothing() {
        assert_eq!(emit(|w| fg(w, Color::Default, OutputMode::Normal)), "");
        assert_eq!(emit(|w| bg(w, Color::Default, OutputMode::Truecolor)), "");
    }

    #[test]
    fn normal_mode_indexed() {
        assert_eq!(emit(|w| fg(w, Color::Indexed(1), OutputMode::Normal)), "\x1b[31m");
        assert_eq!(emit(|w| fg(w, Color::Indexed(9), OutputMode::Normal)), "\x1b[91m");
        assert_eq!(emit(|w| bg(w, Color::Indexed(15), OutputMode::Normal)), "\x1b[107m");
        // beyond the 16-color range there is nothing to say
        assert_eq!(emit(|w| fg(w, Color::Indexed(42), OutputMode::Normal)), "");
    }

    #[test]
    fn palette_256_indexed() {
        assert_eq!(
            emit(|w| fg(w, Color::Indexed(160), OutputMode::Color256)),
            "\x1b[38;5;160m"
        );
        assert_eq!(
            emit(|w| bg(w, Color::Indexed(17), OutputMode::Color256)),
            "\x1b[48;5;17m"
        );
    }

    #[test]
    fn cube_216_applies_palette_offset() {
        assert_eq!(
            emit(|w| fg(w, Color::Indexed(0), OutputMode::Color216)),
            "\x1b[38;5;16m"
        );
        assert_eq!(
            emit(|w| fg(w, Color::Indexed(215), OutputMode::Color216)),
            "\x1b[38;5;231m"
        );
        assert_eq!(emit(|w| fg(w, Color::Indexed(216), OutputMode::Color216)), "");
    }

    #[test]
    fn grayscale_applies_ramp_offset() {
        assert_eq!(
            emit(|w| fg(w, Color::Indexed(0), OutputMode::Grayscale)),
            "\x1b[38;5;232m"
        );
        assert_eq!(
            emit(|w| bg(w, Color::Indexed(23), OutputMode::Grayscale)),
            "\x1b[48;5;255m"
        );
        assert_eq!(emit(|w| fg(w, Color::Indexed(24), OutputMode::Grayscale)), "");
    }

    #[test]
    fn truecolor_rgb() {
        assert_eq!(
            emit(|w| fg(w, Color::Rgb(255, 128, 0), OutputMode::Truecolor)),
            "\x1b[38;2;255;128;0m"
        );
        assert_eq!(
            emit(|w| bg(w, Color::Rgb(0, 0, 0), OutputMode::Truecolor)),
            "\x1b[48;2;0;0;0m"
        );
        // RGB is silent outside truecolor rather than guessing a palette
        assert_eq!(
            emit(|w| fg(w, Color::Rgb(255, 0, 0), OutputMode::Color256)),
            ""
        );
    }

    #[test]
    fn style_pair_resets_then_reemits() {
        let f = Style::new(Color::Red).with(Attr::BOLD);
        let b = Style::new(Color::Blue);
        assert_eq!(
            emit(|w| style_pair(w, f, b, OutputMode::Normal)),
            "\x1b[m\x1b[1m\x1b[31m\x1b[44m"
        );
    }

    #[test]
    fn style_pair_unions_attrs_from_both_planes() {
        let f = Style::new(Color::Default).with(Attr::BOLD);
        let b = Style::new(Color::Default).with(Attr::REVERSE);
        assert_eq!(
            emit(|w| style_pair(w, f, b, OutputMode::Normal)),
            "\x1b[m\x1b[1;7m"
        );
    }
}
