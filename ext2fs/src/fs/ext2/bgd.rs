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

//! The block group descriptor table (GDT): one [`BlockGroupDescriptor`] per group, stored
//! contiguously right after the block holding the superblock.

use macros::AnyRepr;

/// One block group's bookkeeping: where its bitmaps and inode table live, and how much free
/// space it currently has.
#[repr(C)]
#[derive(AnyRepr, Clone, Copy, Debug)]
pub struct BlockGroupDescriptor {
	/// Block number of this group's block usage bitmap.
	pub bg_block_bitmap: u32,
	/// Block number of this group's inode usage bitmap.
	pub bg_inode_bitmap: u32,
	/// First block of this group's inode table.
	pub bg_inode_table: u32,
	/// Number of unallocated blocks in this group.
	pub bg_free_blocks_count: u16,
	/// Number of unallocated inodes in this group.
	pub bg_free_inodes_count: u16,
	/// Number of inodes in this group that are directories.
	pub bg_used_dirs_count: u16,
	/// Unused padding, kept to match the on-disk 32-byte record size.
	pub bg_pad: [u8; 14],
}

impl BlockGroupDescriptor {
	/// The on-disk size, in bytes, of one descriptor.
	pub const SIZE: usize = size_of::<Self>();
}
