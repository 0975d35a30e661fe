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

//! The handful of knobs that differ between a production mount and a test mount.
//!
//! There is no CLI and no config file to parse (the driver has neither), so this is a plain
//! struct with documented defaults rather than a parsing layer.

use crate::time::{Clock, TickClock};
use alloc::sync::Arc;
use core::fmt;

/// What to do when a mutation detects an invariant violation that is recoverable in the sense
/// that the operation can still fail cleanly (a double free against a bitmap, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCorruption {
	/// Log a warning and return [`utils::errno::Errno::EUCLEAN`] to the caller. The default:
	/// matches the "fail loudly, not silently" policy.
	LogAndFail,
	/// Log a warning and panic. Useful when running under a debugger against a disk image
	/// that must never be allowed to drift further from consistency.
	LogAndPanic,
}

impl Default for OnCorruption {
	fn default() -> Self {
		Self::LogAndFail
	}
}

/// Driver-wide configuration, set once at mount time.
#[derive(Clone)]
pub struct DriverConfig {
	/// Policy applied when a corruption check trips.
	pub on_corruption: OnCorruption,
	/// Source of "now" for inode and superblock timestamps. Defaults to a [`TickClock`] a
	/// host advances from its own timer interrupt; tests pin it to a known value instead.
	pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for DriverConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DriverConfig")
			.field("on_corruption", &self.on_corruption)
			.finish_non_exhaustive()
	}
}

impl Default for DriverConfig {
	fn default() -> Self {
		Self {
			on_corruption: OnCorruption::default(),
			clock: Arc::new(TickClock::new()),
		}
	}
}
