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

//! An ext2-compatible filesystem driver.
//!
//! This crate mounts a block device formatted with the second extended filesystem layout,
//! walks its directory tree, and reads, writes, creates, and removes files through the
//! on-disk direct/indirect block trees and bitmap allocators described in [`fs::ext2`].
//!
//! It does not provide: the block device below it (see [`device::BlockDevice`], the boundary
//! this crate consumes), the virtual filesystem layer above it (the [`fs::ext2::node::Node`]
//! handles this crate returns are meant to be wrapped by that layer, not used as one),
//! journaling, or any feature of ext2 beyond what a second-extended volume without extents,
//! large files, or extended attributes needs.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block_io;
pub mod config;
pub mod device;
pub mod fs;
pub mod logger;
pub mod sync;
pub mod time;

pub use fs::ext2::{Ext2Fs, FileType, FsStats, Stat};
