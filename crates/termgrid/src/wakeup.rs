// SPDX-License-Identifier: MIT
//
// SIGWINCH-to-poll bridge via the self-pipe trick.
//
// Safety: This module uses `unsafe` for pipe2/fcntl/sigaction/poll/read/
// write. The signal handler body is restricted to a single write() on a
// non-blocking descriptor, which is async-signal-safe.
#![allow(unsafe_code)]
//
// A signal handler can't touch mutexes, allocators, or channels, so the
// resize notification travels as a single byte through a non-blocking
// pipe. The read end joins the terminal descriptor in one poll() call;
// either becomes readable and the event loop wakes. Pipe writes of one
// byte are atomic, and a full pipe simply drops the byte, which is fine
// because the notification is level-like: one pending byte already means
// "re-query the size".

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

/// Write end of the active wakeup pipe, published for the signal handler.
/// -1 means no channel is installed.
static WAKEUP_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// The signal handler. Only async-signal-safe calls allowed: one write()
/// of a sentinel byte to the non-blocking pipe. Errors (including a full
/// pipe) are deliberately ignored.
extern "C" fn on_sigwinch(_sig: libc::c_int) {
    let fd = WAKEUP_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        unsafe {
            let _ = libc::write(fd, [1u8].as_ptr().cast::<libc::c_void>(), 1);
        }
    }
}

/// What woke the event loop up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The terminal window changed size.
    Resize,
    /// The terminal has bytes to read.
    Input,
    /// The timeout elapsed with nothing to report.
    Timeout,
}

/// A self-pipe wired to `SIGWINCH`, pollable alongside the terminal.
pub struct WakeupChannel {
    read_end: OwnedFd,
    // Held only to keep the descriptor alive; the handler uses the
    // published raw fd.
    _write_end: OwnedFd,
}

impl WakeupChannel {
    /// Create the pipe, mark both ends non-blocking and close-on-exec,
    /// and install the `SIGWINCH` handler.
    ///
    /// # Errors
    ///
    /// Fails if the pipe cannot be created or the handler cannot be
    /// installed.
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe() succeeded, both descriptors are fresh and owned
        // by us from here on.
        let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

        set_nonblocking_cloexec(read_end.as_raw_fd())?;
        set_nonblocking_cloexec(write_end.as_raw_fd())?;

        WAKEUP_WRITE_FD.store(write_end.as_raw_fd(), Ordering::Relaxed);
        install_winch_handler()?;

        Ok(Self {
            read_end,
            _write_end: write_end,
        })
    }

    /// Non-blocking check for a pending resize notification. Drains the
    /// pipe when one is found.
    #[must_use]
    pub fn poll_resize(&self) -> bool {
        let mut fds = [libc::pollfd {
            fd: self.read_end.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
        if rc > 0 && fds[0].revents & libc::POLLIN != 0 {
            self.drain();
            true
        } else {
            false
        }
    }

    /// Push a sentinel byte by hand, as the signal handler would.
    #[cfg(test)]
    fn notify(&self) {
        unsafe {
            let _ = libc::write(
                self._write_end.as_raw_fd(),
                [1u8].as_ptr().cast::<libc::c_void>(),
                1,
            );
        }
    }

    /// Drain every pending sentinel byte. Consecutive size changes
    /// coalesce into one wakeup; the caller re-queries the size once.
    pub fn drain(&self) {
        let fd = self.read_end.as_raw_fd();
        let mut scratch = [0u8; 16];
        loop {
            let n = unsafe {
                libc::read(fd, scratch.as_mut_ptr().cast::<libc::c_void>(), scratch.len())
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// Block until the terminal is readable, a resize arrives, or the
    /// timeout elapses. `None` waits forever.
    ///
    /// Resize wins when both descriptors are ready at once, so a pending
    /// resize is never reported after input that was decoded against the
    /// old dimensions.
    ///
    /// # Errors
    ///
    /// Propagates `poll()` failures other than `EINTR` (which retries
    /// with the remaining timeout).
    pub fn wait(&self, tty_fd: RawFd, timeout: Option<Duration>) -> io::Result<Wake> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let poll_ms: libc::c_int = match deadline {
                None => -1,
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    libc::c_int::try_from(left.as_millis()).unwrap_or(libc::c_int::MAX)
                }
            };

            let mut fds = [
                libc::pollfd {
                    fd: self.read_end.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: tty_fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, poll_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    // The pipe byte, if the interruption was SIGWINCH,
                    // is visible on the next iteration.
                    continue;
                }
                return Err(err);
            }
            if rc == 0 {
                return Ok(Wake::Timeout);
            }
            if fds[0].revents & libc::POLLIN != 0 {
                self.drain();
                return Ok(Wake::Resize);
            }
            if fds[1].revents & (libc::POLLIN | libc::POLLHUP) != 0 {
                return Ok(Wake::Input);
            }
            // Spurious revents (POLLERR on the tty). Treat as readable so
            // the caller's read surfaces the real error.
            if fds[1].revents != 0 {
                return Ok(Wake::Input);
            }
        }
    }
}

impl Drop for WakeupChannel {
    fn drop(&mut self) {
        // Unpublish before the descriptors close so a late signal can't
        // write to a recycled fd.
        WAKEUP_WRITE_FD.store(-1, Ordering::Relaxed);
    }
}

fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(fd, libc::F_GETFD);
        if fd_flags < 0 || libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn install_winch_handler() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigwinch as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&raw mut action.sa_mask);
        if libc::sigaction(libc::SIGWINCH, &raw const action, std::ptr::null_mut()) != 0 {
            let err = io::Error::last_os_error();
            warn!(error = %err, "failed to install SIGWINCH handler");
            return Err(err);
        }
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn timeout_fires_when_nothing_is_ready() {
        let chan = WakeupChannel::new().unwrap();
        // An idle pipe read end stands in for the tty.
        let (idle, _keep) = std::io::pipe().unwrap();
        let wake = chan
            .wait(idle.as_raw_fd(), Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(wake, Wake::Timeout);
    }

    #[test]
    fn input_readiness_is_reported() {
        let chan = WakeupChannel::new().unwrap();
        let (rx, mut tx) = std::io::pipe().unwrap();
        tx.write_all(b"x").unwrap();
        let wake = chan
            .wait(rx.as_raw_fd(), Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(wake, Wake::Input);
    }

    #[test]
    fn resize_wins_over_input() {
        let chan = WakeupChannel::new().unwrap();
        let (rx, mut tx) = std::io::pipe().unwrap();
        tx.write_all(b"x").unwrap();
        // Simulate the signal handler's sentinel write.
        chan.notify();
        let wake = chan
            .wait(rx.as_raw_fd(), Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(wake, Wake::Resize);
        // The sentinel was drained; the pending input is reported next.
        let wake = chan
            .wait(rx.as_raw_fd(), Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(wake, Wake::Input);
    }

    #[test]
    fn drain_coalesces_multiple_sentinels() {
        let chan = WakeupChannel::new().unwrap();
        for _ in 0..5 {
            chan.notify();
        }
        chan.drain();
        let (idle, _keep) = std::io::pipe().unwrap();
        let wake = chan
            .wait(idle.as_raw_fd(), Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(wake, Wake::Timeout);
    }
}
