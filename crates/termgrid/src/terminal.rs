// SPDX-License-Identifier: MIT
//
// Terminal control: raw mode, alternate screen, and RAII cleanup.
//
// Safety: This module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, and raw fd writes. These are
// the standard POSIX interfaces for terminal control; there is no safe
// alternative. Each unsafe block is minimal and documented.
#![allow(unsafe_code)]
//
// This module owns the terminal device and its line-discipline state. It
// opens the tty (the controlling terminal by default, or any path or
// descriptor the caller supplies), snapshots the original termios, enters
// raw mode, switches to the alternate screen, and guarantees the snapshot
// is restored on drop, even if the process panics mid-frame.
//
// The panic hook writes a pre-built restore sequence directly to the tty
// descriptor, bypassing Rust's stdout lock entirely. This prevents
// deadlock if the panic happened while the lock was held (common during a
// frame flush). One raw write, termios restored, then the original panic
// handler prints its message to a working terminal.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::debug;

use crate::ansi;

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Number of columns (width in character cells).
    pub cols: u16,
    /// Number of rows (height in character cells).
    pub rows: u16,
}

impl Size {
    /// Total number of cells (`cols x rows`).
    #[inline]
    #[must_use]
    pub const fn area(self) -> u32 {
        self.cols as u32 * self.rows as u32
    }
}

/// Query the size of the terminal behind `fd` via `ioctl(TIOCGWINSZ)`.
///
/// Returns `None` if `fd` is not a terminal or the query fails.
#[cfg(unix)]
#[must_use]
pub fn query_size(fd: RawFd) -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &raw mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
    } else {
        None
    }
}

/// Whether `fd` is connected to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) != 0 }
}

// ─── Panic-Safe Terminal Restore ────────────────────────────────────────────

/// Global backup of the tty descriptor and original termios for panic
/// recovery. The [`Terminal`] struct owns its own copy, but the panic
/// hook can't reach it; this backup, behind a [`Mutex`] rather than
/// `static mut`, lets the hook restore without the struct.
static TERMIOS_BACKUP: Mutex<Option<(RawFd, libc::termios)>> = Mutex::new(None);

/// Restore termios from the global backup. Best-effort, ignores errors.
fn restore_termios_from_backup() {
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some((fd, ref original)) = *guard {
            unsafe {
                let _ = libc::tcsetattr(fd, libc::TCSANOW, original);
            }
        }
    }
}

/// Complete terminal restore sequence for emergency use.
///
/// Concatenation of: disable mouse reporting (SGR + urxvt + drag + click),
/// reset SGR attributes, leave application keypad mode, show cursor, exit
/// alternate screen. Alternate screen exit is last so the restored shell
/// content appears with no TUI artifacts.
#[rustfmt::skip]
const EMERGENCY_RESTORE: &[u8] = b"\
    \x1b[?1006l\x1b[?1015l\x1b[?1002l\x1b[?1000l\
    \x1b[m\
    \x1b[?1l\x1b>\
    \x1b[?25h\
    \x1b[?1049l";

/// Panic hook guard so the hook installs at most once per process.
static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Install a panic hook that restores the terminal before printing the
/// error. Without this, a panic in raw mode leaves the user's terminal
/// broken: no echo, no line editing, no way to read the message.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();
            restore_termios_from_backup();
            original(info);
        }));
    });
}

/// Write the restore sequence directly to the backed-up tty descriptor,
/// bypassing Rust's stdout lock to avoid deadlocking if the panic
/// occurred while the lock was held.
fn emergency_restore() {
    let fd = TERMIOS_BACKUP
        .lock()
        .ok()
        .and_then(|g| g.map(|(fd, _)| fd))
        .unwrap_or(libc::STDOUT_FILENO);
    unsafe {
        let _ = libc::write(
            fd,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }
}

// ─── Terminal ───────────────────────────────────────────────────────────────

/// The terminal device with RAII cleanup.
///
/// Owns the tty file descriptor and the original termios snapshot. Call
/// [`enter`](Self::enter) to switch to TUI mode (raw mode, alternate
/// screen, mouse reporting); the original state is restored by
/// [`leave`](Self::leave) or automatically on drop, panics included.
pub struct Terminal {
    tty: File,
    /// Original termios saved before entering raw mode.
    original_termios: Option<libc::termios>,
    /// Current terminal size, cached; refresh with
    /// [`refresh_size`](Self::refresh_size).
    size: Size,
    /// Whether we're in TUI mode.
    active: bool,
    /// Whether mouse reporting is requested. Applied on enter and
    /// toggleable at runtime while active.
    mouse: bool,
}

impl Terminal {
    /// Open the controlling terminal (`/dev/tty`).
    ///
    /// # Errors
    ///
    /// Fails if `/dev/tty` cannot be opened read-write.
    pub fn open() -> io::Result<Self> {
        Self::open_path("/dev/tty")
    }

    /// Open a specific terminal device by path.
    ///
    /// # Errors
    ///
    /// Fails if the path cannot be opened read-write.
    pub fn open_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let tty = File::options().read(true).write(true).open(path)?;
        Ok(Self::from_file(tty))
    }

    /// Wrap an already-open terminal descriptor.
    #[must_use]
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self::from_file(File::from(fd))
    }

    fn from_file(tty: File) -> Self {
        let size = query_size(tty.as_raw_fd()).unwrap_or(Size { cols: 80, rows: 24 });
        Self {
            tty,
            original_termios: None,
            size,
            active: false,
            mouse: true,
        }
    }

    /// The raw descriptor, for `poll` integration.
    #[inline]
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.tty.as_raw_fd()
    }

    /// Whether the descriptor is actually a terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        is_tty(self.fd())
    }

    /// Current terminal size (columns, rows).
    #[inline]
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    /// Re-query the terminal size from the OS. Call after a window-size
    /// change notification; the result is cached.
    pub fn refresh_size(&mut self) -> Size {
        if let Some(s) = query_size(self.fd()) {
            self.size = s;
        }
        self.size
    }

    /// Whether we're currently in TUI mode.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Read available bytes from the terminal into `buf`.
    ///
    /// # Errors
    ///
    /// Propagates the underlying read failure.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.tty.read(buf)
    }

    /// Write raw bytes straight to the terminal, bypassing the cell
    /// grids. The escape hatch for sequences the renderer doesn't manage.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write failure.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tty.write_all(bytes)?;
        self.tty.flush()
    }

    /// Enter TUI mode: raw termios, alternate screen, application keypad,
    /// hidden cursor, cleared screen, mouse reporting.
    ///
    /// Idempotent: calling `enter()` while already active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode or terminal output fails.
    pub fn enter(&mut self) -> io::Result<()> {
        if self.active {
            return Ok(());
        }

        install_panic_hook();
        self.enable_raw_mode()?;

        let mut batch = Vec::with_capacity(64);
        ansi::enter_alt_screen(&mut batch)?;
        ansi::enter_keypad(&mut batch)?;
        ansi::cursor_hide(&mut batch)?;
        ansi::clear_screen(&mut batch)?;
        if self.mouse {
            ansi::enable_mouse(&mut batch)?;
        }
        self.tty.write_all(&batch)?;
        self.tty.flush()?;

        self.active = true;
        debug!("entered raw terminal mode");
        Ok(())
    }

    /// Leave TUI mode and restore the terminal: disable mouse reporting,
    /// reset attributes, show the cursor, return to the normal screen,
    /// restore the termios snapshot. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal output or termios restore fails.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }

        let mut batch = Vec::with_capacity(64);
        if self.mouse {
            ansi::disable_mouse(&mut batch)?;
        }
        ansi::reset(&mut batch)?;
        ansi::exit_keypad(&mut batch)?;
        ansi::cursor_show(&mut batch)?;
        ansi::exit_alt_screen(&mut batch)?;
        self.tty.write_all(&batch)?;
        self.tty.flush()?;

        self.disable_raw_mode()?;
        self.active = false;
        debug!("left raw terminal mode");
        Ok(())
    }

    /// Whether mouse reporting is requested.
    #[inline]
    #[must_use]
    pub const fn mouse_enabled(&self) -> bool {
        self.mouse
    }

    /// Turn mouse reporting on or off. While in TUI mode the enable or
    /// disable sequences are written immediately; otherwise the setting
    /// takes effect on the next [`enter`](Self::enter). No-op when the
    /// state already matches.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the sequences fails.
    pub fn set_mouse(&mut self, enabled: bool) -> io::Result<()> {
        if enabled == self.mouse {
            return Ok(());
        }
        if self.active {
            let mut batch = Vec::with_capacity(40);
            if enabled {
                ansi::enable_mouse(&mut batch)?;
            } else {
                ansi::disable_mouse(&mut batch)?;
            }
            self.tty.write_all(&batch)?;
            self.tty.flush()?;
        }
        self.mouse = enabled;
        debug!(enabled, "mouse reporting toggled");
        Ok(())
    }

    // ── Raw Mode (termios) ──────────────────────────────────────────

    fn enable_raw_mode(&mut self) -> io::Result<()> {
        if !self.is_terminal() {
            return Ok(());
        }

        let fd = self.fd();
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            // Save original for restore, plus the global backup for the
            // panic hook.
            self.original_termios = Some(termios);
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some((fd, termios));
            }

            // cfmakeraw equivalent: disable all line processing.
            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &=
                !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;

            // VMIN=1, VTIME=0: read() blocks until at least 1 byte is
            // available. Waiting with a timeout happens in poll, not here.
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        if let Some(ref original) = self.original_termios {
            let fd = self.fd();
            unsafe {
                if libc::tcsetattr(fd, libc::TCSAFLUSH, original) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            // Restored successfully; the panic hook has nothing to do.
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = None;
            }
            self.original_termios = None;
        }

        Ok(())
    }
}

impl Write for Terminal {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tty.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.tty.flush()
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.active {
            let _ = self.leave();
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Size ──────────────────────────────────────────────────────────

    #[test]
    fn size_area() {
        assert_eq!(Size { cols: 80, rows: 24 }.area(), 1920);
        assert_eq!(Size { cols: 0, rows: 24 }.area(), 0);
        assert_eq!(Size { cols: 500, rows: 200 }.area(), 100_000);
    }

    #[test]
    fn size_is_copy_and_comparable() {
        let a = Size { cols: 80, rows: 24 };
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, Size { cols: 120, rows: 40 });
    }

    // ── Emergency restore sequence ──────────────────────────────────

    #[test]
    fn emergency_restore_is_valid_utf8() {
        std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
    }

    #[test]
    fn emergency_restore_exits_alt_screen_last() {
        let s = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        assert!(s.ends_with("\x1b[?1049l"));
    }

    #[test]
    fn emergency_restore_contains_all_sequences() {
        let s = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        assert!(s.contains("\x1b[?1000l"), "must disable mouse clicks");
        assert!(s.contains("\x1b[?1002l"), "must disable mouse drag");
        assert!(s.contains("\x1b[?1015l"), "must disable urxvt mouse format");
        assert!(s.contains("\x1b[?1006l"), "must disable SGR mouse format");
        assert!(s.contains("\x1b[m"), "must reset SGR attributes");
        assert!(s.contains("\x1b[?1l\x1b>"), "must leave keypad mode");
        assert!(s.contains("\x1b[?25h"), "must show cursor");
    }

    // ── Terminal queries ─────────────────────────────────────────────

    #[test]
    fn query_size_on_non_tty_is_none() {
        // descriptors from a pipe are never terminals
        let (r, _w) = std::io::pipe().unwrap();
        assert_eq!(query_size(r.as_raw_fd()), None);
        assert!(!is_tty(r.as_raw_fd()));
    }
}
