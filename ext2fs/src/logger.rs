/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Driver diagnostics.
//!
//! Every I/O failure and every detected invariant violation (double free, corrupt on-disk
//! structure) is accompanied by a log line instead of being swallowed. There is no host
//! console to assume here, so the logger keeps its own ring buffer and a caller pulls lines
//! out of it, rather than writing straight to a screen the way the rest of this codebase's
//! logger does.

use crate::sync::Spin;
use core::{cmp::min, fmt, fmt::Write};

/// The size of the log ring buffer, in bytes.
const LOG_BUF_SIZE: usize = 16384;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
	/// Allocator and block-map bookkeeping; compiled out of release profiles.
	Trace,
	/// Lifecycle events: mount, unmount, create, unlink.
	Info,
	/// Recoverable anomalies: double free, short read, a corruption check that tripped.
	Warn,
}

/// The driver's logger.
///
/// Internally a ring buffer, the same shape the rest of this codebase's kernel logger uses,
/// minus the direct write to a terminal.
pub struct Logger {
	buf: [u8; LOG_BUF_SIZE],
	read_head: usize,
	write_head: usize,
}

impl Logger {
	const fn new() -> Self {
		Self {
			buf: [0; LOG_BUF_SIZE],
			read_head: 0,
			write_head: 0,
		}
	}

	fn available_space(&self) -> usize {
		use core::cmp::Ordering;
		match self.write_head.cmp(&self.read_head) {
			Ordering::Equal => self.buf.len(),
			Ordering::Greater => self.buf.len() - (self.write_head - self.read_head),
			Ordering::Less => self.read_head - self.write_head - 1,
		}
	}

	/// Pops at least `n` bytes from the buffer, rounding up to the next newline so a partial
	/// line is never left dangling at the read head.
	fn pop(&mut self, n: usize) {
		let read_new = (self.read_head + n) % self.buf.len();
		if read_new >= self.write_head && read_new < self.read_head {
			self.read_head = self.write_head;
			return;
		}
		let mut i = 0;
		while i < self.buf.len() {
			let off = (read_new + i) % self.buf.len();
			if off == self.write_head || self.buf[off] == b'\n' {
				break;
			}
			i += 1;
		}
		self.read_head = (read_new + i) % self.buf.len();
	}

	fn push(&mut self, s: &[u8]) {
		if self.available_space() < s.len() {
			self.pop(s.len() - self.available_space());
		}
		let len = min(self.available_space(), s.len());
		let end = (self.write_head + len) % self.buf.len();
		if end < self.write_head {
			self.buf[self.write_head..].copy_from_slice(&s[0..(len - end)]);
			self.buf[0..end].copy_from_slice(&s[(len - end)..]);
		} else {
			self.buf[self.write_head..end].copy_from_slice(&s[0..len]);
		}
		self.write_head = end;
	}

	/// Returns the currently buffered log text, oldest first.
	///
	/// The returned slice wraps around the ring, so a caller that wants a contiguous string
	/// should copy it out; tests just search for a substring across the two halves instead.
	pub fn contents(&self) -> (&[u8], &[u8]) {
		if self.read_head <= self.write_head {
			(&self.buf[self.read_head..self.write_head], &[])
		} else {
			(&self.buf[self.read_head..], &self.buf[..self.write_head])
		}
	}
}

impl Write for Logger {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.push(s.as_bytes());
		Ok(())
	}
}

/// The driver-wide logger instance.
pub static LOGGER: Spin<Logger> = Spin::new(Logger::new());

/// Writes one log line at the given level. Used by the [`trace!`], [`info!`], and [`warn!`]
/// macros; not meant to be called directly.
pub fn log_line(level: Level, args: fmt::Arguments) {
	let prefix = match level {
		Level::Trace => "trace",
		Level::Info => "info",
		Level::Warn => "warn",
	};
	let mut logger = LOGGER.lock();
	let _ = writeln!(logger, "[{prefix}] {args}");
}

/// Logs a trace-level line: allocator and block-map bookkeeping.
#[macro_export]
macro_rules! trace {
	($($arg:tt)*) => {
		$crate::logger::log_line($crate::logger::Level::Trace, format_args!($($arg)*))
	};
}

/// Logs an info-level line: mount/unmount/create/unlink lifecycle events.
#[macro_export]
macro_rules! info {
	($($arg:tt)*) => {
		$crate::logger::log_line($crate::logger::Level::Info, format_args!($($arg)*))
	};
}

/// Logs a warn-level line: a recoverable anomaly was detected (double free, short read,
/// tripped corruption check).
#[macro_export]
macro_rules! warn {
	($($arg:tt)*) => {
		$crate::logger::log_line($crate::logger::Level::Warn, format_args!($($arg)*))
	};
}
