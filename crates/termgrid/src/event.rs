// SPDX-License-Identifier: MIT
//
// Structured input events.
//
// The decoder normalizes the terminal's vendor-divergent byte stream into
// these types. A key is either a named code or a character, never both;
// modifier state rides alongside as a flag set. Mouse events carry the
// 0-based cell coordinates and the same modifier flags, plus MOTION for
// drag reports.

bitflags::bitflags! {
    /// Modifier keys held during a key or mouse event.
    ///
    /// The low bits follow the xterm modifyOtherKeys convention: the
    /// numeric modifier code `n` in a CSI sequence encodes `n - 1` as a
    /// bitmask of shift/alt/ctrl/meta. [`MOTION`](Mod::MOTION) is ours:
    /// set on mouse drag reports, which share the modifier field on the
    /// wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Mod: u8 {
        const SHIFT  = 1 << 0;
        const ALT    = 1 << 1;
        const CTRL   = 1 << 2;
        const META   = 1 << 3;
        const MOTION = 1 << 4;
    }
}

impl Mod {
    /// Decode an xterm numeric modifier code (the `m` in `CSI 1;m X`).
    /// Codes run 2-9; 1 or anything out of range means no modifiers.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        if (2..=9).contains(&code) {
            Self::from_bits_truncate(code - 1)
        } else {
            Self::empty()
        }
    }
}

/// A key identity: a named key or a printable character.
///
/// Control bytes normalize to `Char` plus [`Mod::CTRL`] (byte 0x01 is
/// ctrl+a, and so on), so consumers match on one representation no matter
/// how the terminal chose to encode the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key: `F(1)` through `F(12)`.
    F(u8),
}

/// A decoded keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: Mod,
}

impl KeyEvent {
    #[inline]
    #[must_use]
    pub const fn new(code: KeyCode, mods: Mod) -> Self {
        Self { code, mods }
    }

    /// A key press with no modifiers.
    #[inline]
    #[must_use]
    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, Mod::empty())
    }
}

/// Which mouse control changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    /// A button was released. The X10 protocol cannot say which.
    Release,
}

/// A decoded mouse event with 0-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub mods: Mod,
    pub x: u16,
    pub y: u16,
}

/// Anything the terminal can tell us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize { width: u16, height: u16 },
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn modifier_codes_follow_xterm_convention() {
        assert_eq!(Mod::from_code(2), Mod::SHIFT);
        assert_eq!(Mod::from_code(3), Mod::ALT);
        assert_eq!(Mod::from_code(4), Mod::ALT | Mod::SHIFT);
        assert_eq!(Mod::from_code(5), Mod::CTRL);
        assert_eq!(Mod::from_code(6), Mod::CTRL | Mod::SHIFT);
        assert_eq!(Mod::from_code(7), Mod::CTRL | Mod::ALT);
        assert_eq!(Mod::from_code(8), Mod::CTRL | Mod::ALT | Mod::SHIFT);
        assert_eq!(Mod::from_code(9), Mod::META);
    }

    #[test]
    fn out_of_range_codes_mean_unmodified() {
        assert_eq!(Mod::from_code(0), Mod::empty());
        assert_eq!(Mod::from_code(1), Mod::empty());
        assert_eq!(Mod::from_code(10), Mod::empty());
    }

    #[test]
    fn plain_key_has_no_mods() {
        let k = KeyEvent::plain(KeyCode::Up);
        assert_eq!(k.code, KeyCode::Up);
        assert!(k.mods.is_empty());
    }
}
