// SPDX-License-Identifier: MIT
//
// Escape-sequence decoding: raw terminal bytes to structured events.
//
// This is the hard part of terminal input. Escape sequences are not
// self-describing: length and meaning depend on the terminal vendor
// (xterm, urxvt, mrxvt, the Linux console), and prefixes of valid
// sequences are themselves valid shorter sequences. ESC alone is a key;
// ESC '[' starts most sequences; ESC '[' 'A' is the up arrow.
//
// The design splits into:
//
//   decode()    a pure function from a byte window to a Decoded outcome:
//               a recognized event plus its consumed byte count,
//               "incomplete, feed me more", or "unrecognized, discard".
//   tables      declarative sequence-to-key lists, one general and one
//               consulted first on the Linux console.
//   sub-parsers parse_mouse, parse_csi, parse_ss3: small pure functions
//               over byte slices for the parametric sequence families.
//   Decoder     the stateful accumulator owning the bounded working
//               window, profile, and input mode; feeds decode() and
//               finalizes pending bytes when a read burst ends.
//
// Unrecognized input always consumes at least one byte, so garbage can
// never stall the input loop.

use tracing::warn;

use crate::event::{Event, KeyCode, KeyEvent, Mod, MouseButton, MouseEvent};

/// Longest escape sequence the decoder will buffer. A sequence still
/// incomplete at this length is reported unrecognized instead of growing
/// the window.
pub const MAX_SEQUENCE: usize = 14;

const ESC: u8 = 0x1b;

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of one decode attempt over a byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized event and the number of bytes it consumed.
    Event(Event, usize),
    /// The window holds a valid prefix; more bytes are needed.
    Incomplete,
    /// The window starts with bytes that form no known or partial
    /// sequence. The count (always at least 1) says how many to discard.
    Unrecognized(usize),
}

/// What an unmatched lone ESC prefix means.
///
/// In `Esc` mode an ESC that introduces no recognized sequence is the
/// escape key itself. In `Alt` mode it is a modifier prefix: the ESC is
/// consumed and the following key carries [`Mod::ALT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Esc,
    Alt,
}

/// Which sequence tables to consult, selected from `$TERM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// xterm, urxvt, mrxvt and everything claiming compatibility.
    #[default]
    General,
    /// The Linux virtual console, which has its own rxvt-flavored
    /// sequences for shifted and control-modified navigation keys.
    LinuxConsole,
}

impl Profile {
    /// Pick the profile for a `$TERM` value.
    #[must_use]
    pub fn from_term(term: &str) -> Self {
        if term == "linux" {
            Self::LinuxConsole
        } else {
            Self::General
        }
    }
}

// ─── Sequence tables ─────────────────────────────────────────────────────────

struct Seq {
    bytes: &'static [u8],
    code: KeyCode,
    mods: Mod,
}

const fn seq(bytes: &'static [u8], code: KeyCode, mods: Mod) -> Seq {
    Seq { bytes, code, mods }
}

/// SS3-style and oddball sequences common to all terminals. Arrows and
/// navigation in CSI form are handled parametrically by `parse_csi`, so
/// only the sequences with no parameter structure live here.
const GENERAL_SEQS: &[Seq] = &[
    seq(b"\x1bOA", KeyCode::Up, Mod::empty()),
    seq(b"\x1bOB", KeyCode::Down, Mod::empty()),
    seq(b"\x1bOC", KeyCode::Right, Mod::empty()),
    seq(b"\x1bOD", KeyCode::Left, Mod::empty()),
    seq(b"\x1bOH", KeyCode::Home, Mod::empty()),
    seq(b"\x1bOF", KeyCode::End, Mod::empty()),
    seq(b"\x1bOP", KeyCode::F(1), Mod::empty()),
    seq(b"\x1bOQ", KeyCode::F(2), Mod::empty()),
    seq(b"\x1bOR", KeyCode::F(3), Mod::empty()),
    seq(b"\x1bOS", KeyCode::F(4), Mod::empty()),
    seq(b"\x1bOa", KeyCode::Up, Mod::CTRL),
    seq(b"\x1bOb", KeyCode::Down, Mod::CTRL),
    seq(b"\x1bOc", KeyCode::Right, Mod::CTRL),
    seq(b"\x1bOd", KeyCode::Left, Mod::CTRL),
];

/// Linux-console-specific sequences, consulted before everything else on
/// that profile. The alt+shift arrow forms carry a literal double escape.
const LINUX_SEQS: &[Seq] = &[
    seq(b"\x1b\x1b[a", KeyCode::Up, Mod::ALT.union(Mod::SHIFT)),
    seq(b"\x1b\x1b[b", KeyCode::Down, Mod::ALT.union(Mod::SHIFT)),
    seq(b"\x1b\x1b[c", KeyCode::Right, Mod::ALT.union(Mod::SHIFT)),
    seq(b"\x1b\x1b[d", KeyCode::Left, Mod::ALT.union(Mod::SHIFT)),
    seq(b"\x1b[a", KeyCode::Up, Mod::SHIFT),
    seq(b"\x1b[b", KeyCode::Down, Mod::SHIFT),
    seq(b"\x1b[c", KeyCode::Right, Mod::SHIFT),
    seq(b"\x1b[d", KeyCode::Left, Mod::SHIFT),
    seq(b"\x1b[Z", KeyCode::Tab, Mod::SHIFT),
];

fn table_lookup(bytes: &[u8], profile: Profile) -> Option<Decoded> {
    let tables: &[&[Seq]] = match profile {
        Profile::LinuxConsole => &[LINUX_SEQS, GENERAL_SEQS],
        Profile::General => &[GENERAL_SEQS],
    };
    let mut prefix_possible = false;
    for table in tables {
        for entry in *table {
            if bytes.starts_with(entry.bytes) {
                let ev = Event::Key(KeyEvent::new(entry.code, entry.mods));
                return Some(Decoded::Event(ev, entry.bytes.len()));
            }
            if entry.bytes.starts_with(bytes) {
                prefix_possible = true;
            }
        }
    }
    prefix_possible.then_some(Decoded::Incomplete)
}

// ─── Top-level decode ────────────────────────────────────────────────────────

/// Decode the first event in `bytes`.
///
/// Pure: same window, same answer. The caller owns windowing and the
/// decision to finalize a pending prefix when no more bytes are coming
/// (see [`Decoder::flush`]).
#[must_use]
pub fn decode(bytes: &[u8], profile: Profile, mode: InputMode) -> Decoded {
    let Some(&first) = bytes.first() else {
        return Decoded::Incomplete;
    };
    if first == ESC {
        decode_escape(bytes, profile, mode)
    } else {
        decode_plain(bytes)
    }
}

/// Classify a non-escape leading byte: control key, printable ASCII, or
/// the start of a UTF-8 sequence.
fn decode_plain(bytes: &[u8]) -> Decoded {
    let b = bytes[0];
    let key = |code, mods| Decoded::Event(Event::Key(KeyEvent::new(code, mods)), 1);

    match b {
        0 => key(KeyCode::Char(' '), Mod::CTRL),
        8 | 0x7f => key(KeyCode::Backspace, Mod::empty()),
        9 => key(KeyCode::Tab, Mod::empty()),
        13 => key(KeyCode::Enter, Mod::empty()),
        1..=26 => key(KeyCode::Char((b'a' + b - 1) as char), Mod::CTRL),
        28..=31 => {
            let ch = match b {
                28 => '\\',
                29 => ']',
                30 => '^',
                _ => '_',
            };
            key(KeyCode::Char(ch), Mod::CTRL)
        }
        b'A'..=b'Z' => key(KeyCode::Char(b as char), Mod::SHIFT),
        0x20..=0x7e => key(KeyCode::Char(b as char), Mod::empty()),
        _ => decode_utf8(bytes, Mod::empty()),
    }
}

/// Decode a UTF-8 character at the start of the window.
fn decode_utf8(bytes: &[u8], mods: Mod) -> Decoded {
    let Some(len) = utf8_len(bytes[0]) else {
        return Decoded::Unrecognized(1);
    };
    if bytes.len() < len {
        return Decoded::Incomplete;
    }
    match std::str::from_utf8(&bytes[..len]) {
        Ok(s) => {
            // utf8_len guarantees exactly one scalar in the slice
            let ch = s.chars().next().unwrap_or(' ');
            Decoded::Event(Event::Key(KeyEvent::new(KeyCode::Char(ch), mods)), len)
        }
        Err(_) => Decoded::Unrecognized(1),
    }
}

const fn utf8_len(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7f => Some(1),
        0xc0..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf7 => Some(4),
        _ => None,
    }
}

/// The escape-prefixed half of the state machine: mouse first (its prefix
/// is unambiguous), then the exact tables, then the parametric dispatch on
/// the second byte.
fn decode_escape(bytes: &[u8], profile: Profile, mode: InputMode) -> Decoded {
    if bytes.len() == 1 {
        // Could be the escape key or the start of anything. Only the
        // caller knows whether more bytes are forthcoming.
        return Decoded::Incomplete;
    }

    match parse_mouse(bytes) {
        MouseParse::Done(event, n) => return Decoded::Event(event, n),
        MouseParse::Partial => return Decoded::Incomplete,
        MouseParse::No => {}
    }

    if let Some(hit) = table_lookup(bytes, profile) {
        return hit;
    }

    match bytes[1] {
        b'[' => parse_csi(bytes),
        b'O' => parse_ss3(bytes),
        ESC => match mode {
            // A second escape ends the first: it is the escape key, and
            // the next sequence starts fresh at the second ESC.
            InputMode::Esc => esc_key(),
            // In alt mode the first ESC is a modifier prefix.
            InputMode::Alt => alt_wrap(decode(&bytes[1..], profile, mode)),
        },
        _ => match mode {
            InputMode::Esc => esc_key(),
            InputMode::Alt => alt_wrap(decode(&bytes[1..], profile, mode)),
        },
    }
}

fn esc_key() -> Decoded {
    Decoded::Event(Event::Key(KeyEvent::plain(KeyCode::Esc)), 1)
}

/// Wrap an inner decode with the ALT modifier and the consumed ESC byte.
fn alt_wrap(inner: Decoded) -> Decoded {
    match inner {
        Decoded::Event(Event::Key(mut k), n) => {
            k.mods |= Mod::ALT;
            Decoded::Event(Event::Key(k), n + 1)
        }
        Decoded::Event(ev, n) => Decoded::Event(ev, n + 1),
        Decoded::Incomplete => Decoded::Incomplete,
        Decoded::Unrecognized(n) => Decoded::Unrecognized(n + 1),
    }
}

// ─── CSI sub-parser ──────────────────────────────────────────────────────────

/// Parse `ESC [ params final`.
///
/// Finals understood:
/// - `~ $ ^ @`: navigation/function keys by number, with the rxvt
///   terminator itself encoding modifiers (`$` shift, `^` ctrl, `@`
///   always ctrl+alt+shift) and an optional `;m` numeric modifier.
/// - uppercase letters: arrows, home/end, F1-F4, shift-tab, with the
///   xterm `1;m` modifier form.
/// - lowercase `a`-`d`: rxvt shifted arrows.
fn parse_csi(bytes: &[u8]) -> Decoded {
    let mut i = 2;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b';') {
        i += 1;
    }
    if i == bytes.len() {
        return Decoded::Incomplete;
    }
    let fin = bytes[i];
    if fin == ESC {
        // A new sequence starts mid-parse: the bytes so far are garbage,
        // but the ESC belongs to the next sequence.
        return Decoded::Unrecognized(i);
    }
    let consumed = i + 1;
    let params = parse_params(&bytes[2..i]);

    let done = |code, mods| Decoded::Event(Event::Key(KeyEvent::new(code, mods)), consumed);

    match fin {
        b'~' | b'$' | b'^' | b'@' => {
            let Some(code) = tilde_key(params.first().copied().unwrap_or(0)) else {
                return Decoded::Unrecognized(consumed);
            };
            let mut mods = params
                .get(1)
                .map_or(Mod::empty(), |&m| Mod::from_code(u8::try_from(m).unwrap_or(0)));
            mods |= match fin {
                b'$' => Mod::SHIFT,
                b'^' => Mod::CTRL,
                b'@' => Mod::CTRL | Mod::ALT | Mod::SHIFT,
                _ => Mod::empty(),
            };
            done(code, mods)
        }
        b'A'..=b'Z' => {
            let Some(code) = letter_key(fin) else {
                return Decoded::Unrecognized(consumed);
            };
            let mut mods = params
                .get(1)
                .map_or(Mod::empty(), |&m| Mod::from_code(u8::try_from(m).unwrap_or(0)));
            if fin == b'Z' {
                mods |= Mod::SHIFT;
            }
            done(code, mods)
        }
        b'a'..=b'd' => done(arrow_for(fin - b'a' + b'A'), Mod::SHIFT),
        _ => Decoded::Unrecognized(consumed),
    }
}

fn parse_params(raw: &[u8]) -> Vec<u16> {
    raw.split(|&b| b == b';')
        .map(|field| {
            field
                .iter()
                .fold(0u16, |acc, &d| acc.saturating_mul(10).saturating_add(u16::from(d - b'0')))
        })
        .collect()
}

/// The `CSI n ~` key numbering shared by xterm and rxvt.
#[allow(clippy::cast_possible_truncation)] // the ranges below keep n small
const fn tilde_key(n: u16) -> Option<KeyCode> {
    match n {
        1 | 7 => Some(KeyCode::Home),
        2 => Some(KeyCode::Insert),
        3 => Some(KeyCode::Delete),
        4 | 8 => Some(KeyCode::End),
        5 => Some(KeyCode::PageUp),
        6 => Some(KeyCode::PageDown),
        11..=15 => Some(KeyCode::F((n - 10) as u8)),
        17..=21 => Some(KeyCode::F((n - 11) as u8)),
        23 | 24 => Some(KeyCode::F((n - 12) as u8)),
        _ => None,
    }
}

const fn letter_key(fin: u8) -> Option<KeyCode> {
    match fin {
        b'A' => Some(KeyCode::Up),
        b'B' => Some(KeyCode::Down),
        b'C' => Some(KeyCode::Right),
        b'D' => Some(KeyCode::Left),
        b'H' => Some(KeyCode::Home),
        b'F' => Some(KeyCode::End),
        b'P' => Some(KeyCode::F(1)),
        b'Q' => Some(KeyCode::F(2)),
        b'R' => Some(KeyCode::F(3)),
        b'S' => Some(KeyCode::F(4)),
        b'Z' => Some(KeyCode::Tab),
        _ => None,
    }
}

const fn arrow_for(fin: u8) -> KeyCode {
    match fin {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        _ => KeyCode::Left,
    }
}

// ─── SS3 sub-parser ──────────────────────────────────────────────────────────

/// Parse `ESC O x`. SS3 sequences carry no parameters; the modified forms
/// of these keys arrive in CSI `1;m` dress and are handled by `parse_csi`.
fn parse_ss3(bytes: &[u8]) -> Decoded {
    if bytes.len() < 3 {
        return Decoded::Incomplete;
    }
    let fin = bytes[2];
    if fin == ESC {
        return Decoded::Unrecognized(2);
    }
    match letter_key(fin) {
        Some(code) if fin != b'Z' => {
            Decoded::Event(Event::Key(KeyEvent::plain(code)), 3)
        }
        _ => Decoded::Unrecognized(3),
    }
}

// ─── Mouse sub-parser ────────────────────────────────────────────────────────

enum MouseParse {
    Done(Event, usize),
    Partial,
    No,
}

/// Classify the three mouse wire encodings:
///
/// - X10: `ESC [ M b x y`, single bytes biased by +32, coordinates
///   further biased by +1 and capped at 223 by the 8-bit field.
/// - SGR 1006: `ESC [ < b ; x ; y (M|m)`, decimal fields, lowercase `m`
///   meaning release.
/// - urxvt 1015: `ESC [ b ; x ; y M`, decimal fields with the X10 +32
///   bias still on the button field.
///
/// Button/modifier bit layout is identical across all three: low two bits
/// select the button (3 = release), bit 6 marks wheel, bit 5 drag motion,
/// and bits 2-4 are shift/alt/ctrl.
fn parse_mouse(bytes: &[u8]) -> MouseParse {
    debug_assert_eq!(bytes[0], ESC);
    if bytes.len() < 3 || bytes[1] != b'[' {
        return MouseParse::No;
    }

    match bytes[2] {
        b'M' => parse_mouse_x10(bytes),
        b'<' => parse_mouse_decimal(bytes, 3, false),
        b'0'..=b'9' => parse_mouse_decimal(bytes, 2, true),
        _ => MouseParse::No,
    }
}

fn parse_mouse_x10(bytes: &[u8]) -> MouseParse {
    if bytes.len() < 6 {
        return MouseParse::Partial;
    }
    let b = u16::from(bytes[3].wrapping_sub(32));
    let Some((button, mods)) = button_and_mods(b) else {
        return MouseParse::No;
    };
    let event = Event::Mouse(MouseEvent {
        button,
        mods,
        x: u16::from(bytes[4].saturating_sub(32).saturating_sub(1)),
        y: u16::from(bytes[5].saturating_sub(32).saturating_sub(1)),
    });
    MouseParse::Done(event, 6)
}

/// Shared body for the SGR (`<`-prefixed) and urxvt decimal encodings.
/// `start` points at the first digit; `urxvt` selects the +32 button bias
/// and disables the lowercase-m release convention.
fn parse_mouse_decimal(bytes: &[u8], start: usize, urxvt: bool) -> MouseParse {
    let mut i = start;
    let mut fields: Vec<u16> = vec![0];
    let mut seen_digit = false;
    while i < bytes.len() {
        match bytes[i] {
            d @ b'0'..=b'9' => {
                seen_digit = true;
                if let Some(last) = fields.last_mut() {
                    *last = last.saturating_mul(10).saturating_add(u16::from(d - b'0'));
                }
            }
            b';' => fields.push(0),
            b'M' | b'm' => break,
            _ => return MouseParse::No,
        }
        i += 1;
    }
    if i == bytes.len() {
        // Digits and separators so far; the final byte hasn't arrived.
        // The CSI key parser reaches the same verdict for the ambiguous
        // urxvt prefix, so reporting partial here is safe either way.
        return MouseParse::Partial;
    }
    if !seen_digit || fields.len() != 3 {
        return MouseParse::No;
    }
    let is_release_final = bytes[i] == b'm';
    if urxvt && is_release_final {
        return MouseParse::No;
    }

    let mut b = fields[0];
    if urxvt {
        b = b.wrapping_sub(32);
    }
    let Some((mut button, mods)) = button_and_mods(b) else {
        return MouseParse::No;
    };
    if is_release_final {
        // SGR signals release with the lowercase final, keeping the
        // button bits for which button went up. We fold it to Release to
        // match the other protocols' vocabulary.
        button = MouseButton::Release;
    }
    let event = Event::Mouse(MouseEvent {
        button,
        mods,
        x: fields[1].saturating_sub(1),
        y: fields[2].saturating_sub(1),
    });
    MouseParse::Done(event, i + 1)
}

/// Split a button field into the button selector and modifier flags.
/// Bit pattern 3 in the low bits means release; the SGR protocol also
/// signals release via its lowercase final, which the caller folds in.
fn button_and_mods(b: u16) -> Option<(MouseButton, Mod)> {
    let mut mods = Mod::empty();
    if b & 4 != 0 {
        mods |= Mod::SHIFT;
    }
    if b & 8 != 0 {
        mods |= Mod::ALT;
    }
    if b & 16 != 0 {
        mods |= Mod::CTRL;
    }
    if b & 32 != 0 {
        mods |= Mod::MOTION;
    }
    let wheel = b & 64 != 0;
    let button = match (b & 3, wheel) {
        (0, true) => MouseButton::WheelUp,
        (1, true) => MouseButton::WheelDown,
        (0, false) => MouseButton::Left,
        (1, false) => MouseButton::Middle,
        (2, _) => MouseButton::Right,
        (3, _) => MouseButton::Release,
        _ => return None,
    };
    Some((button, mods))
}

// ─── Decoder ─────────────────────────────────────────────────────────────────

/// Stateful accumulator over the pure [`decode`] function.
///
/// Owns the bounded working window. Bytes go in via [`advance`]; complete
/// events come out immediately, a trailing prefix stays buffered. When a
/// read burst ends with no more bytes forthcoming, [`flush`] finalizes
/// the pending prefix: a lone ESC becomes the escape key, anything else
/// unresolvable is discarded.
///
/// [`advance`]: Decoder::advance
/// [`flush`]: Decoder::flush
#[derive(Debug, Default)]
pub struct Decoder {
    buf: Vec<u8>,
    profile: Profile,
    mode: InputMode,
}

impl Decoder {
    #[must_use]
    pub fn new(profile: Profile, mode: InputMode) -> Self {
        Self {
            buf: Vec::with_capacity(MAX_SEQUENCE),
            profile,
            mode,
        }
    }

    /// Switch how an unmatched ESC prefix is interpreted.
    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    #[must_use]
    pub const fn input_mode(&self) -> InputMode {
        self.mode
    }

    /// Whether bytes are buffered awaiting completion.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Feed raw bytes, returning every event that completes.
    pub fn advance(&mut self, bytes: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        self.drain(&mut events, false);
        events
    }

    /// Finalize pending bytes after a quiet read: no more input is
    /// imminent, so an accumulated prefix is as complete as it will get.
    pub fn flush(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        self.drain(&mut events, true);
        events
    }

    fn drain(&mut self, events: &mut Vec<Event>, finalize: bool) {
        loop {
            if self.buf.is_empty() {
                return;
            }
            match decode(&self.buf, self.profile, self.mode) {
                Decoded::Event(ev, n) => {
                    events.push(ev);
                    self.buf.drain(..n);
                }
                Decoded::Incomplete => {
                    if self.buf.len() >= MAX_SEQUENCE {
                        // The window is full and still ambiguous; no real
                        // sequence is this long.
                        warn!(len = self.buf.len(), "discarding overlong escape sequence");
                        self.buf.clear();
                        return;
                    }
                    if !finalize {
                        return;
                    }
                    if !self.finalize_prefix(events) {
                        return;
                    }
                }
                Decoded::Unrecognized(n) => {
                    warn!(discarded = n, "discarding unrecognized input bytes");
                    self.buf.drain(..n.max(1));
                }
            }
        }
    }

    /// Resolve an incomplete prefix at end-of-burst. Returns false when
    /// nothing more can be made of the buffer.
    fn finalize_prefix(&mut self, events: &mut Vec<Event>) -> bool {
        if self.buf[0] == ESC {
            // The sequence will never finish. The introducer resolves per
            // the input mode: in esc mode it is the escape key, in alt
            // mode a modifier with nothing left to modify. Either way the
            // remaining bytes re-decode on their own, guaranteeing
            // forward progress.
            if self.mode == InputMode::Esc || self.buf.len() == 1 {
                events.push(Event::Key(KeyEvent::plain(KeyCode::Esc)));
            } else {
                warn!("discarding dangling alt prefix");
            }
            let emptied = self.buf.len() == 1;
            self.buf.drain(..1);
            !emptied
        } else {
            // A truncated UTF-8 character; nothing to salvage.
            warn!(len = self.buf.len(), "discarding truncated input");
            self.buf.clear();
            false
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
