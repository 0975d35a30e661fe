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

//! Implementation-defined limits referenced throughout the driver.

/// Maximum length of a file name, in bytes, not counting a terminator.
pub const NAME_MAX: usize = 255;

/// The size, in bytes, of a memory page. Used only to size scratch buffers; the driver does
/// not itself page-cache anything.
pub const PAGE_SIZE: usize = 4096;

/// Maximum length of a symbolic link target.
pub const SYMLINK_MAX: usize = 4096;
