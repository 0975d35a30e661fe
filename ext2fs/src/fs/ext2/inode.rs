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

//! An inode represents a file in the filesystem: its metadata lives here, its name lives in
//! whatever directory entries point to it (several may, for hard links).
//!
//! The fifteen-slot block pointer array is the one structure in this driver that is never
//! open-coded at a call site: [`BlockMapEntry::resolve`] is the single pure function that
//! turns a logical block index into the indirection shape needed to reach it, and every other
//! piece of this module goes through it.

use super::Ext2Fs;
use macros::AnyRepr;
use utils::{errno, errno::EResult};

/// Maximum number of direct block pointers.
pub const DIRECT_BLOCKS_COUNT: usize = 12;
/// Index of the single-indirect block pointer within [`Ext2INode::i_block`].
const SINGLE_INDIRECT: usize = 12;
/// Index of the double-indirect block pointer within [`Ext2INode::i_block`].
const DOUBLE_INDIRECT: usize = 13;
/// Index of the triple-indirect block pointer within [`Ext2INode::i_block`]. Never populated
/// by this driver; see [`Ext2INode::free_content`] for how it is still drained on delete.
const TRIPLE_INDIRECT: usize = 14;

/// `i_flags`: secure deletion.
#[allow(dead_code)]
const INODE_FLAG_SECURE_DELETION: u32 = 0x00001;

/// The number of 512-byte sectors counted per block, regardless of the filesystem's own block
/// size; a fixed unit of the on-disk format, not a device property.
const SECTOR_SIZE: u32 = 512;

/// An inode record, exactly as it sits on disk: 128 bytes, independent of whatever
/// `s_inode_size` reports for filesystems with a larger extended record.
#[repr(C)]
#[derive(AnyRepr, Clone, Copy, Debug)]
pub struct Ext2INode {
	/// Type and permission bits.
	pub i_mode: u16,
	/// Owning user ID.
	pub i_uid: u16,
	/// Size in bytes (low 32 bits; this driver never sets the high half, see [`Non-goals`]).
	pub i_size: u32,
	/// Time of last access.
	pub i_atime: u32,
	/// Time of creation, by this driver's convention (`§9`'s first open question keeps the
	/// on-disk field name `i_ctime` for wire compatibility; see the derived `ctime`/`dtime`
	/// accessors on [`super::Stat`] for where that distinction actually matters).
	pub i_ctime: u32,
	/// Time of last content modification.
	pub i_mtime: u32,
	/// Time of deletion; zero while the inode is live.
	pub i_dtime: u32,
	/// Owning group ID.
	pub i_gid: u16,
	/// Number of hard links.
	pub i_links_count: u16,
	/// Number of 512-byte sectors occupied by this inode's data and indirect blocks.
	pub i_blocks: u32,
	/// Flags; none are interpreted by this driver.
	pub i_flags: u32,
	/// OS-specific field; unused.
	pub i_osd1: u32,
	/// Direct (0..11), single-indirect (12), double-indirect (13), and triple-indirect (14,
	/// reserved) block pointers.
	pub i_block: [u32; DIRECT_BLOCKS_COUNT + 3],
	/// Generation number; unused by this driver.
	pub i_generation: u32,
	/// Extended attribute block; never populated (extended attributes are a non-goal).
	pub i_file_acl: u32,
	/// High 32 bits of size on revision-1 filesystems with the large-file feature; unused.
	pub i_dir_acl: u32,
	/// Fragment address; obsolete, unused.
	pub i_faddr: u32,
	/// OS-specific trailer; unused.
	pub i_osd2: [u8; 12],
}

impl Ext2INode {
	/// A fresh, all-zero inode record.
	pub fn new() -> Self {
		unsafe { core::mem::zeroed() }
	}

	/// Returns the file's type, or `None` if the mode bits name something this driver does
	/// not produce or traverse (device files, symlinks, and the like).
	pub fn file_type(&self) -> Option<super::FileType> {
		match self.i_mode & 0xf000 {
			super::MODE_DIRECTORY => Some(super::FileType::Directory),
			super::MODE_REGULAR => Some(super::FileType::Regular),
			_ => None,
		}
	}

	/// Is this inode live, in the sense the spec defines: a positive link count and no
	/// recorded deletion time?
	pub fn is_live(&self) -> bool {
		self.i_links_count > 0 && self.i_dtime == 0
	}
}

impl Default for Ext2INode {
	fn default() -> Self {
		Self::new()
	}
}

/// The indirection shape needed to reach one logical block, produced by
/// [`BlockMapEntry::resolve`].
///
/// Modeling this as a tagged variant instead of open-coding the arithmetic at every call site
/// is what keeps [`Ext2Fs::translate_block`] and [`Ext2Fs::alloc_block_for`] in lockstep: both
/// switch on the same three shapes and neither can drift from the other's notion of where the
/// direct/indirect/double-indirect boundaries fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockMapEntry {
	/// Slot `i_block[index]` directly holds the physical block.
	Direct(usize),
	/// Reached through the single-indirect block at `i_block[12]`, entry `offset`.
	SingleIndirect(usize),
	/// Reached through the double-indirect block at `i_block[13]`: entry `outer` of the
	/// double-indirect block names an indirect block, entry `inner` of which holds the
	/// physical block.
	DoubleIndirect(usize, usize),
}

impl BlockMapEntry {
	/// Resolves logical block index `l` to the indirection shape needed to reach it, given
	/// `entries_per_block` 32-bit pointers per indirect block.
	///
	/// Returns [`utils::errno::Errno::ENOTSUP`] for the triple-indirect range: this driver's
	/// ceiling is `(12 + P + P^2)` blocks, consistent with the "no triple indirection"
	/// non-goal.
	pub(crate) fn resolve(l: u32, entries_per_block: u32) -> EResult<Self> {
		let p = entries_per_block as u64;
		let l = l as u64;
		if l < DIRECT_BLOCKS_COUNT as u64 {
			return Ok(Self::Direct(l as usize));
		}
		let l = l - DIRECT_BLOCKS_COUNT as u64;
		if l < p {
			return Ok(Self::SingleIndirect(l as usize));
		}
		let l = l - p;
		if l < p * p {
			return Ok(Self::DoubleIndirect((l / p) as usize, (l % p) as usize));
		}
		Err(errno!(ENOTSUP))
	}
}

impl Ext2Fs {
	/// Reads the 32-bit entry at index `index` of the indirect block `blk`.
	fn read_indirect_entry(&self, blk: u32, index: usize) -> EResult<u32> {
		let mut buf = self.new_block_buf();
		self.read_block(blk, &mut buf)?;
		let off = index * 4;
		Ok(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()))
	}

	/// Writes the 32-bit entry at index `index` of the indirect block `blk`.
	fn write_indirect_entry(&self, blk: u32, index: usize, value: u32) -> EResult<()> {
		let mut buf = self.new_block_buf();
		self.read_block(blk, &mut buf)?;
		let off = index * 4;
		buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
		self.write_block(blk, &buf)
	}

	/// Maps logical block `l` of `inode` to a physical block number, without allocating.
	///
	/// Returns `0` ("hole") if the block has never been written, including when `l` falls
	/// past the double-indirect ceiling — a read from such a range is still a valid sparse
	/// hole, it is only *writes* past that ceiling that are refused.
	pub(crate) fn translate_block(&self, inode: &Ext2INode, l: u32) -> EResult<u32> {
		let entry = match BlockMapEntry::resolve(l, self.entries_per_block()) {
			Ok(e) => e,
			Err(_) => return Ok(0),
		};
		match entry {
			BlockMapEntry::Direct(i) => Ok(inode.i_block[i]),
			BlockMapEntry::SingleIndirect(off) => {
				let ind = inode.i_block[SINGLE_INDIRECT];
				if ind == 0 {
					return Ok(0);
				}
				self.read_indirect_entry(ind, off)
			}
			BlockMapEntry::DoubleIndirect(outer, inner) => {
				let dbl = inode.i_block[DOUBLE_INDIRECT];
				if dbl == 0 {
					return Ok(0);
				}
				let ind = self.read_indirect_entry(dbl, outer)?;
				if ind == 0 {
					return Ok(0);
				}
				self.read_indirect_entry(ind, inner)
			}
		}
	}

	/// Maps logical block `l` of `inode` to a physical block number, allocating any direct or
	/// intermediate indirect block that is missing.
	///
	/// `i_block` slots are updated in place; the caller is responsible for persisting the
	/// owning inode record afterward (this mirrors every other mutator in this module: the
	/// in-memory inode is the single owning value, and only its caller knows when the batch
	/// of slot mutations it is making is complete). Indirect blocks themselves are persisted
	/// immediately, since nothing else will write them.
	///
	/// Returns [`utils::errno::Errno::ENOTSUP`] past the double-indirect ceiling, rather than
	/// silently truncating the write.
	pub(crate) fn alloc_block_for(&self, inode: &mut Ext2INode, l: u32) -> EResult<u32> {
		match BlockMapEntry::resolve(l, self.entries_per_block())? {
			BlockMapEntry::Direct(i) => {
				if inode.i_block[i] == 0 {
					let blk = self.alloc_block()?;
					self.zero_block(blk)?;
					inode.i_block[i] = blk;
					inode.i_blocks += self.sectors_per_block();
				}
				Ok(inode.i_block[i])
			}
			BlockMapEntry::SingleIndirect(off) => {
				let ind = self.ensure_indirect(&mut inode.i_block[SINGLE_INDIRECT], inode)?;
				self.ensure_leaf(ind, off, inode)
			}
			BlockMapEntry::DoubleIndirect(outer, inner) => {
				let dbl = self.ensure_indirect(&mut inode.i_block[DOUBLE_INDIRECT], inode)?;
				let ind = self.ensure_indirect_entry(dbl, outer, inode)?;
				self.ensure_leaf(ind, inner, inode)
			}
		}
	}

	/// Allocates `*slot` if it is zero, counting the new block against `inode`'s sector
	/// count. Returns the (possibly just-allocated) block number.
	fn ensure_indirect(&self, slot: &mut u32, inode: &mut Ext2INode) -> EResult<u32> {
		if *slot == 0 {
			let blk = self.alloc_block()?;
			self.zero_block(blk)?;
			*slot = blk;
			inode.i_blocks += self.sectors_per_block();
		}
		Ok(*slot)
	}

	/// Like [`Self::ensure_indirect`], but the slot lives at `index` inside indirect block
	/// `parent` rather than directly in the inode.
	fn ensure_indirect_entry(
		&self,
		parent: u32,
		index: usize,
		inode: &mut Ext2INode,
	) -> EResult<u32> {
		let existing = self.read_indirect_entry(parent, index)?;
		if existing != 0 {
			return Ok(existing);
		}
		let blk = self.alloc_block()?;
		self.zero_block(blk)?;
		self.write_indirect_entry(parent, index, blk)?;
		inode.i_blocks += self.sectors_per_block();
		Ok(blk)
	}

	/// Allocates the data block at `index` inside indirect block `ind`, if absent, and
	/// returns its physical block number.
	fn ensure_leaf(&self, ind: u32, index: usize, inode: &mut Ext2INode) -> EResult<u32> {
		let existing = self.read_indirect_entry(ind, index)?;
		if existing != 0 {
			return Ok(existing);
		}
		let blk = self.alloc_block()?;
		self.zero_block(blk)?;
		self.write_indirect_entry(ind, index, blk)?;
		inode.i_blocks += self.sectors_per_block();
		Ok(blk)
	}

	/// Frees every data and indirect block reachable from `inode`'s block pointer array, then
	/// zeroes the array.
	///
	/// The triple-indirect slot (14) is never populated by this driver, but a foreign image
	/// could carry one; it is freed as a single block without walking whatever it points to,
	/// which leaks that subtree. This is the documented consequence of not implementing
	/// triple indirection (`§9`).
	pub(crate) fn free_all_blocks(&self, inode: &mut Ext2INode) -> EResult<()> {
		for i in 0..DIRECT_BLOCKS_COUNT {
			if inode.i_block[i] != 0 {
				self.free_block(inode.i_block[i])?;
			}
		}
		if inode.i_block[SINGLE_INDIRECT] != 0 {
			self.free_indirect_level(inode.i_block[SINGLE_INDIRECT], 0)?;
		}
		if inode.i_block[DOUBLE_INDIRECT] != 0 {
			self.free_indirect_level(inode.i_block[DOUBLE_INDIRECT], 1)?;
		}
		if inode.i_block[TRIPLE_INDIRECT] != 0 {
			self.free_block(inode.i_block[TRIPLE_INDIRECT])?;
		}
		inode.i_block = [0; DIRECT_BLOCKS_COUNT + 3];
		inode.i_blocks = 0;
		Ok(())
	}

	/// Frees indirect block `blk` and, when `depth > 0`, every indirect block it points to
	/// (one level deep for a double-indirect tree; this driver never recurses past that).
	fn free_indirect_level(&self, blk: u32, depth: u32) -> EResult<()> {
		let entries = self.entries_per_block() as usize;
		let mut buf = self.new_block_buf();
		self.read_block(blk, &mut buf)?;
		for i in 0..entries {
			let off = i * 4;
			let ptr = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
			if ptr == 0 {
				continue;
			}
			if depth > 0 {
				self.free_indirect_level(ptr, depth - 1)?;
			} else {
				self.free_block(ptr)?;
			}
		}
		self.free_block(blk)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn resolves_direct_range() {
		assert_eq!(BlockMapEntry::resolve(0, 256).unwrap(), BlockMapEntry::Direct(0));
		assert_eq!(BlockMapEntry::resolve(11, 256).unwrap(), BlockMapEntry::Direct(11));
	}

	#[test]
	fn resolves_single_indirect_range() {
		assert_eq!(
			BlockMapEntry::resolve(12, 256).unwrap(),
			BlockMapEntry::SingleIndirect(0)
		);
		assert_eq!(
			BlockMapEntry::resolve(12 + 255, 256).unwrap(),
			BlockMapEntry::SingleIndirect(255)
		);
	}

	#[test]
	fn resolves_double_indirect_range() {
		let p = 256u32;
		assert_eq!(
			BlockMapEntry::resolve(12 + p, p).unwrap(),
			BlockMapEntry::DoubleIndirect(0, 0)
		);
		assert_eq!(
			BlockMapEntry::resolve(12 + p + p + 5, p).unwrap(),
			BlockMapEntry::DoubleIndirect(1, 5)
		);
	}

	#[test]
	fn rejects_triple_indirect_range() {
		let p = 256u32;
		assert!(BlockMapEntry::resolve(12 + p + p * p, p).is_err());
	}
}
