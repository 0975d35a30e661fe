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

//! Error kinds propagated out of the filesystem driver.

use core::fmt;

/// The error kinds the driver can return.
///
/// These map onto the boundary failure indicators (null handle, `false`, `-1`) at the
/// outermost call only; internally they are threaded through with `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
	/// The underlying block device failed a read, write, or flush.
	EIO,
	/// A value was out of the range the caller can accept.
	EINVAL,
	/// No free block or inode was available.
	ENOSPC,
	/// A scratch buffer could not be allocated.
	ENOMEM,
	/// A lookup found nothing with the requested name.
	ENOENT,
	/// The operation requires a directory but the node is not one.
	ENOTDIR,
	/// The operation refuses to act on a directory.
	EISDIR,
	/// A name exceeds the filesystem's maximum length.
	ENAMETOOLONG,
	/// A computation on a logical block index exceeded what the driver supports.
	EOVERFLOW,
	/// An on-disk structure failed validation: bad magic, unsupported block size, an
	/// inode or block index that does not correspond to anything, a double free.
	EUCLEAN,
	/// The operation is understood but deliberately not implemented (directory removal,
	/// triple indirection).
	ENOTSUP,
}

impl Errno {
	/// Returns a short, stable name for the error, suitable for log lines.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::EIO => "EIO",
			Self::EINVAL => "EINVAL",
			Self::ENOSPC => "ENOSPC",
			Self::ENOMEM => "ENOMEM",
			Self::ENOENT => "ENOENT",
			Self::ENOTDIR => "ENOTDIR",
			Self::EISDIR => "EISDIR",
			Self::ENAMETOOLONG => "ENAMETOOLONG",
			Self::EOVERFLOW => "EOVERFLOW",
			Self::EUCLEAN => "EUCLEAN",
			Self::ENOTSUP => "ENOTSUP",
		}
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Shorthand for `Result<T, Errno>`, the return type of almost every driver function.
pub type EResult<T> = Result<T, Errno>;

/// The error returned when a scratch-buffer allocation fails.
///
/// Kept distinct from [`Errno`] so call sites that can only fail on allocation (as opposed
/// to I/O or format errors) carry that guarantee in their signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		Errno::ENOMEM
	}
}

/// Shorthand for `Result<T, AllocError>`.
pub type AllocResult<T> = Result<T, AllocError>;

/// Builds an [`Errno`] value from one of its variant names.
///
/// Mirrors the POSIX constant spelling used throughout this codebase so call sites read the
/// same whether they are producing a driver-internal error or translating a libc one.
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}
