// SPDX-License-Identifier: MIT
//
// termgrid: minimal terminal UI layer over a cell grid.
//
// A double-buffered terminal abstraction: the screen is a grid of styled
// cells, drawing mutates an in-memory back buffer, and present() diffs it
// against the displayed front buffer and writes only the changed cells.
// Input arrives as decoded key, mouse, and resize events from a single
// poll-based wait.
//
// This crate intentionally avoids external TUI frameworks (ratatui,
// crossterm) in favor of direct terminal control via ANSI escape
// sequences and raw termios. Every byte sent to the terminal is
// accounted for. Every frame is diffed. Every escape code is earned.

pub mod ansi;
pub mod buffer;
pub mod cell;
pub mod diff;
pub mod event;
pub mod input;
pub mod output;
#[cfg(unix)]
pub mod screen;
#[cfg(unix)]
pub mod terminal;
#[cfg(unix)]
pub mod wakeup;

pub use ansi::OutputMode;
pub use buffer::CellGrid;
pub use cell::{Attr, Cell, Color, Style};
pub use event::{Event, KeyCode, KeyEvent, Mod, MouseButton, MouseEvent};
pub use input::{Decoder, InputMode, Profile};
#[cfg(unix)]
pub use screen::{InitError, Screen};
