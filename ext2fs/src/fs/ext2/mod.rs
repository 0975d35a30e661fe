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

//! The ext2 filesystem is a classical filesystem used in Unix systems.
//!
//! The device is divided into block groups, each holding a slice of the block and inode
//! bitmaps, a slice of the inode table, and whatever data blocks its files were assigned to.
//! A file's data is reached through its inode's block pointers: twelve direct pointers,
//! then a singly-indirect pointer, then a doubly-indirect pointer. This driver does not
//! populate or walk a triply-indirect pointer; see [`inode`] for why that ceiling is where
//! it is.

pub mod bgd;
pub mod dirent;
pub mod file;
pub mod inode;
pub mod node;
#[cfg(test)]
mod scenarios;
#[cfg(test)]
pub(crate) mod test_util;

use crate::{
	block_io,
	config::DriverConfig,
	device::BlockDevice,
	sync::Spin,
};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use bgd::BlockGroupDescriptor;
use macros::AnyRepr;
use utils::{errno, errno::EResult};

/// The filesystem's magic number.
pub const MAGIC: u16 = 0xEF53;
/// The inode number of the root directory.
pub const ROOT_INODE: u32 = 2;
/// Byte offset of the superblock, regardless of block size.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// The size, in bytes, of one on-disk inode record, independent of what `s_inode_size`
/// reports for filesystems with a larger extended record.
const INODE_RECORD_SIZE: usize = 128;

/// The type of a file this driver can create or traverse.
///
/// Device files, FIFOs, sockets, and symlinks may exist on a real ext2 volume, but creating
/// or interpreting them is not something this driver does; encountering one during a scan is
/// handled by the directory iteration code, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
	Regular,
	Directory,
}

/// Mode bits identifying a regular file.
pub const MODE_REGULAR: u16 = 0x8000;
/// Mode bits identifying a directory.
pub const MODE_DIRECTORY: u16 = 0x4000;

/// A snapshot of a node's metadata, returned by `stat`-like queries.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub mode: u16,
	pub uid: u16,
	pub gid: u16,
	pub size: u32,
	/// Number of 512-byte sectors occupied by the file's data and indirect blocks.
	pub blocks: u32,
	pub nlink: u16,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
}

/// Filesystem-wide usage and identification data, returned by `get_fs_stats`.
#[derive(Debug, Clone, Copy)]
pub struct FsStats {
	pub block_size: u32,
	pub groups_count: u32,
	pub total_blocks: u32,
	pub free_blocks: u32,
	pub total_inodes: u32,
	pub free_inodes: u32,
	pub volume_label: [u8; 16],
	pub last_mount_path: [u8; 64],
	pub state: u16,
	pub rev_level: u32,
}

impl FsStats {
	/// Total size of the volume, in kilobytes.
	pub fn total_kb(&self) -> u64 {
		self.total_blocks as u64 * self.block_size as u64 / 1024
	}

	/// Free space on the volume, in kilobytes.
	pub fn free_kb(&self) -> u64 {
		self.free_blocks as u64 * self.block_size as u64 / 1024
	}
}

/// The on-disk ext2 superblock.
///
/// Lives at byte offset [`SUPERBLOCK_OFFSET`] regardless of block size. Its layout is fixed
/// by the on-disk format; nothing here may be reordered or resized without breaking
/// compatibility with every other ext2 implementation.
#[repr(C)]
#[derive(AnyRepr, Clone, Copy, Debug)]
pub struct Superblock {
	pub s_inodes_count: u32,
	pub s_blocks_count: u32,
	pub s_r_blocks_count: u32,
	pub s_free_blocks_count: u32,
	pub s_free_inodes_count: u32,
	pub s_first_data_block: u32,
	/// `block_size = 1024 << s_log_block_size`.
	pub s_log_block_size: u32,
	pub s_log_frag_size: u32,
	pub s_blocks_per_group: u32,
	pub s_frags_per_group: u32,
	pub s_inodes_per_group: u32,
	pub s_mtime: u32,
	pub s_wtime: u32,
	pub s_mnt_count: u16,
	pub s_max_mnt_count: u16,
	pub s_magic: u16,
	pub s_state: u16,
	pub s_errors: u16,
	pub s_minor_rev_level: u16,
	pub s_lastcheck: u32,
	pub s_checkinterval: u32,
	pub s_creator_os: u32,
	pub s_rev_level: u32,
	pub s_def_resuid: u16,
	pub s_def_resgid: u16,
	pub s_first_ino: u32,
	/// Size in bytes of one on-disk inode record. `0` on revision-0 filesystems, which means
	/// 128.
	pub s_inode_size: u16,
	pub s_block_group_nr: u16,
	pub s_feature_compat: u32,
	pub s_feature_incompat: u32,
	pub s_feature_ro_compat: u32,
	pub s_uuid: [u8; 16],
	pub s_volume_name: [u8; 16],
	pub s_last_mounted: [u8; 64],
	pub s_algo_bitmap: u32,
	pub s_prealloc_blocks: u8,
	pub s_prealloc_dir_blocks: u8,
	_pad0: u16,
	pub s_journal_uuid: [u8; 16],
	pub s_journal_inum: u32,
	pub s_journal_dev: u32,
	pub s_last_orphan: u32,
	_padding: [u8; 788],
}

impl Superblock {
	fn block_size(&self) -> u32 {
		1024u32 << self.s_log_block_size
	}

	fn inode_record_size(&self) -> usize {
		if self.s_inode_size == 0 {
			INODE_RECORD_SIZE
		} else {
			self.s_inode_size as usize
		}
	}
}

/// Filesystem state shared by every node handle of one mounted volume: the superblock and
/// the group descriptor table, the only pieces of state a mutation ever touches.
struct FsMeta {
	sp: Superblock,
	gdt: Vec<BlockGroupDescriptor>,
}

/// A mounted ext2 volume.
///
/// Shared by every live [`node::Node`] of that volume via `Arc`. All mutable state is behind
/// [`Spin`] guards: the device behind one, the superblock and group descriptor table behind
/// another. Nothing here assumes more than one holder of either lock at a time; see the
/// crate-level [`crate::sync`] module for why a lock exists here at all despite the driver
/// being logically single-threaded.
pub struct Ext2Fs {
	dev: Spin<Box<dyn BlockDevice>>,
	meta: Spin<FsMeta>,
	block_size: u32,
	groups_count: u32,
	config: DriverConfig,
}

impl Ext2Fs {
	/// Mounts the filesystem on `dev`.
	///
	/// Loads and validates the superblock, derives the block size, and loads the whole group
	/// descriptor table into memory.
	pub fn mount(dev: Box<dyn BlockDevice>, config: DriverConfig) -> EResult<Arc<Self>> {
		let sp = block_io::read_struct::<Superblock>(dev.as_ref(), SUPERBLOCK_OFFSET)?;
		if sp.s_magic != MAGIC {
			return Err(errno!(EINVAL));
		}
		let block_size = sp.block_size();
		if !matches!(block_size, 1024 | 2048 | 4096) {
			return Err(errno!(EINVAL));
		}
		if sp.s_blocks_per_group == 0 || sp.s_inodes_per_group == 0 {
			return Err(errno!(EUCLEAN));
		}
		let groups_count = sp.s_blocks_count.div_ceil(sp.s_blocks_per_group);
		let gdt_start_block: u32 = if block_size == 1024 { 2 } else { 1 };
		let bgd_per_block = block_size as usize / BlockGroupDescriptor::SIZE;
		let gdt_blocks = (groups_count as usize).div_ceil(bgd_per_block);
		let mut gdt = Vec::with_capacity(groups_count as usize);
		let mut buf = alloc::vec![0u8; block_size as usize];
		'outer: for i in 0..gdt_blocks {
			block_io::read_block(dev.as_ref(), block_size, gdt_start_block + i as u32, &mut buf)?;
			for slot in 0..bgd_per_block {
				if gdt.len() == groups_count as usize {
					break 'outer;
				}
				let off = slot * BlockGroupDescriptor::SIZE;
				let bgd = *utils::repr::from_bytes::<BlockGroupDescriptor>(&buf[off..])
					.ok_or(errno!(EUCLEAN))?;
				gdt.push(bgd);
			}
		}
		crate::info!(
			"mounted ext2 volume: {} blocks of {} bytes, {} groups",
			sp.s_blocks_count,
			block_size,
			groups_count
		);
		Ok(Arc::new(Self {
			dev: Spin::new(dev),
			meta: Spin::new(FsMeta {
				sp,
				gdt,
			}),
			block_size,
			groups_count,
			config,
		}))
	}

	/// The size, in bytes, of one filesystem block.
	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	/// Number of 512-byte sectors in one filesystem block.
	fn sectors_per_block(&self) -> u32 {
		self.block_size / crate::device::SECTOR_SIZE as u32
	}

	/// Number of 32-bit block pointers that fit in one indirect block.
	fn entries_per_block(&self) -> u32 {
		self.block_size / 4
	}

	/// Allocates a zeroed scratch buffer sized to one filesystem block.
	fn new_block_buf(&self) -> Vec<u8> {
		alloc::vec![0u8; self.block_size as usize]
	}

	/// Reads one filesystem block. Rejects block `0`, which is never a valid data block
	/// (block `0` is the boot sector / part of the superblock's own block).
	pub(crate) fn read_block(&self, blk: u32, buf: &mut [u8]) -> EResult<()> {
		if blk == 0 {
			return Err(errno!(EINVAL));
		}
		let dev = self.dev.lock();
		block_io::read_block(&**dev, self.block_size, blk, buf)
	}

	/// Writes one filesystem block and flushes the device.
	pub(crate) fn write_block(&self, blk: u32, buf: &[u8]) -> EResult<()> {
		if blk == 0 {
			return Err(errno!(EINVAL));
		}
		let mut dev = self.dev.lock();
		block_io::write_block(&mut **dev, self.block_size, blk, buf)
	}

	/// Zeroes an entire block. Used right after allocating one, since the allocator never
	/// hands out pre-zeroed storage.
	pub(crate) fn zero_block(&self, blk: u32) -> EResult<()> {
		let buf = self.new_block_buf();
		self.write_block(blk, &buf)
	}

	fn persist_superblock(&self, meta: &FsMeta) -> EResult<()> {
		let bytes = unsafe {
			core::slice::from_raw_parts(
				&meta.sp as *const Superblock as *const u8,
				size_of::<Superblock>(),
			)
		};
		let mut dev = self.dev.lock();
		block_io::write_bytes(&mut **dev, SUPERBLOCK_OFFSET, bytes)?;
		dev.flush()
	}

	fn gdt_location(&self) -> (u32, usize) {
		let gdt_start_block: u32 = if self.block_size == 1024 { 2 } else { 1 };
		let bgd_per_block = self.block_size as usize / BlockGroupDescriptor::SIZE;
		(gdt_start_block, bgd_per_block)
	}

	fn persist_group(&self, meta: &FsMeta, group: u32) -> EResult<()> {
		let (gdt_start_block, bgd_per_block) = self.gdt_location();
		let blk = gdt_start_block + group / bgd_per_block as u32;
		let slot = group as usize % bgd_per_block;
		let bgd = meta.gdt[group as usize];
		let bytes = unsafe {
			core::slice::from_raw_parts(
				&bgd as *const BlockGroupDescriptor as *const u8,
				BlockGroupDescriptor::SIZE,
			)
		};
		let off = blk as u64 * self.block_size as u64 + (slot * BlockGroupDescriptor::SIZE) as u64;
		let mut dev = self.dev.lock();
		block_io::write_bytes(&mut **dev, off, bytes)?;
		dev.flush()
	}

	/// Reacts to a detected corruption (so far: a double free against a bitmap) according to
	/// [`DriverConfig::on_corruption`]. Always logs a warning first; `LogAndPanic` then panics
	/// the host rather than letting the caller limp along against a bitmap that no longer
	/// matches reality.
	fn on_corruption_detected(&self, msg: &str) -> EResult<()> {
		crate::warn!("{msg}");
		match self.config.on_corruption {
			crate::config::OnCorruption::LogAndFail => Err(errno!(EUCLEAN)),
			crate::config::OnCorruption::LogAndPanic => panic!("{msg}"),
		}
	}

	/// Finds the first zero bit among the first `limit_bits` bits of `buf`.
	fn first_zero_bit(buf: &[u8], limit_bits: u32) -> Option<u32> {
		for (i, &byte) in buf.iter().enumerate() {
			let base = i as u32 * 8;
			if base >= limit_bits {
				break;
			}
			if byte != 0xFF {
				let bit = base + byte.trailing_ones();
				if bit < limit_bits {
					return Some(bit);
				}
			}
		}
		None
	}

	/// Finds a free bit in the bitmap starting at block `start_blk`, sets it, and returns its
	/// index. Returns `None` if every one of the first `total_bits` bits is set.
	fn bitmap_find_and_set(&self, start_blk: u32, total_bits: u32) -> EResult<Option<u32>> {
		let bits_per_block = self.block_size * 8;
		let blocks = total_bits.div_ceil(bits_per_block);
		let mut buf = self.new_block_buf();
		for b in 0..blocks {
			self.read_block(start_blk + b, &mut buf)?;
			let remaining = total_bits - b * bits_per_block;
			if let Some(bit) = Self::first_zero_bit(&buf, remaining.min(bits_per_block)) {
				buf[(bit / 8) as usize] |= 1 << (bit % 8);
				self.write_block(start_blk + b, &buf)?;
				return Ok(Some(b * bits_per_block + bit));
			}
		}
		Ok(None)
	}

	/// Clears the bit at `index` in the bitmap starting at block `start_blk`. Returns whether
	/// the bit was previously set (a double free clears an already-clear bit, which the
	/// caller treats as corruption).
	fn bitmap_clear(&self, start_blk: u32, index: u32) -> EResult<bool> {
		let bits_per_block = self.block_size * 8;
		let b = index / bits_per_block;
		let bit = index % bits_per_block;
		let mut buf = self.new_block_buf();
		self.read_block(start_blk + b, &mut buf)?;
		let byte = &mut buf[(bit / 8) as usize];
		let mask = 1u8 << (bit % 8);
		let was_set = *byte & mask != 0;
		*byte &= !mask;
		self.write_block(start_blk + b, &buf)?;
		Ok(was_set)
	}

	/// Allocates a free block, marking it used in the bitmap and decrementing the group's and
	/// the superblock's free counts.
	///
	/// Groups are tried lowest-first; within a group, the lowest free bit wins. No attempt is
	/// made to cluster allocations for locality.
	pub(crate) fn alloc_block(&self) -> EResult<u32> {
		let mut meta = self.meta.lock();
		if meta.sp.s_free_blocks_count == 0 {
			return Err(errno!(ENOSPC));
		}
		for group in 0..self.groups_count {
			let bgd = meta.gdt[group as usize];
			if bgd.bg_free_blocks_count == 0 {
				continue;
			}
			let group_start = group * meta.sp.s_blocks_per_group;
			// The group's bitmap addresses blocks starting at `first_data_block`, not at
			// block 0, so the number of valid bits in a (possibly short) last group must
			// subtract that offset as well as the group's own start.
			let addressable = meta
				.sp
				.s_blocks_count
				.saturating_sub(meta.sp.s_first_data_block);
			let bits = meta.sp.s_blocks_per_group.min(addressable.saturating_sub(group_start));
			let Some(bit) = self.bitmap_find_and_set(bgd.bg_block_bitmap, bits)? else {
				continue;
			};
			let block = group_start + bit + meta.sp.s_first_data_block;
			meta.sp.s_free_blocks_count -= 1;
			meta.gdt[group as usize].bg_free_blocks_count -= 1;
			self.persist_superblock(&meta)?;
			self.persist_group(&meta, group)?;
			crate::trace!("allocated block {block} in group {group}");
			return Ok(block);
		}
		Err(errno!(ENOSPC))
	}

	/// Frees a previously allocated block.
	///
	/// Freeing a block whose bit is already clear is corruption, not a silent success: it is
	/// logged and reported as [`utils::errno::Errno::EUCLEAN`].
	pub(crate) fn free_block(&self, blk: u32) -> EResult<()> {
		let mut meta = self.meta.lock();
		if blk < meta.sp.s_first_data_block || blk >= meta.sp.s_blocks_count {
			return Err(errno!(EUCLEAN));
		}
		let rel = blk - meta.sp.s_first_data_block;
		let group = rel / meta.sp.s_blocks_per_group;
		let bit = rel % meta.sp.s_blocks_per_group;
		let bitmap_blk = meta.gdt[group as usize].bg_block_bitmap;
		if !self.bitmap_clear(bitmap_blk, bit)? {
			return self.on_corruption_detected(&alloc::format!("double free of block {blk}"));
		}
		meta.sp.s_free_blocks_count += 1;
		meta.gdt[group as usize].bg_free_blocks_count += 1;
		self.persist_superblock(&meta)?;
		self.persist_group(&meta, group)
	}

	/// Allocates a free inode, marking it used in the inode bitmap and decrementing the
	/// group's and the superblock's free counts. Increments the group's directory count when
	/// `directory` is set.
	pub(crate) fn alloc_inode(&self, directory: bool) -> EResult<u32> {
		let mut meta = self.meta.lock();
		if meta.sp.s_free_inodes_count == 0 {
			return Err(errno!(ENOSPC));
		}
		for group in 0..self.groups_count {
			let bgd = meta.gdt[group as usize];
			if bgd.bg_free_inodes_count == 0 {
				continue;
			}
			let Some(bit) =
				self.bitmap_find_and_set(bgd.bg_inode_bitmap, meta.sp.s_inodes_per_group)?
			else {
				continue;
			};
			let inode = group * meta.sp.s_inodes_per_group + bit + 1;
			meta.sp.s_free_inodes_count -= 1;
			meta.gdt[group as usize].bg_free_inodes_count -= 1;
			if directory {
				meta.gdt[group as usize].bg_used_dirs_count += 1;
			}
			self.persist_superblock(&meta)?;
			self.persist_group(&meta, group)?;
			crate::trace!("allocated inode {inode} in group {group}");
			return Ok(inode);
		}
		Err(errno!(ENOSPC))
	}

	/// Frees a previously allocated inode.
	pub(crate) fn free_inode(&self, inode: u32, directory: bool) -> EResult<()> {
		let mut meta = self.meta.lock();
		if inode == 0 {
			return Err(errno!(EINVAL));
		}
		let group = (inode - 1) / meta.sp.s_inodes_per_group;
		let bit = (inode - 1) % meta.sp.s_inodes_per_group;
		let bitmap_blk = meta.gdt[group as usize].bg_inode_bitmap;
		if !self.bitmap_clear(bitmap_blk, bit)? {
			return self.on_corruption_detected(&alloc::format!("double free of inode {inode}"));
		}
		meta.sp.s_free_inodes_count += 1;
		meta.gdt[group as usize].bg_free_inodes_count += 1;
		if directory {
			meta.gdt[group as usize].bg_used_dirs_count =
				meta.gdt[group as usize].bg_used_dirs_count.saturating_sub(1);
		}
		self.persist_superblock(&meta)?;
		self.persist_group(&meta, group)
	}

	fn inode_location(&self, meta: &FsMeta, n: u32) -> EResult<u64> {
		if n == 0 {
			return Err(errno!(EINVAL));
		}
		let idx = n - 1;
		let group = idx / meta.sp.s_inodes_per_group;
		if group >= self.groups_count {
			return Err(errno!(EUCLEAN));
		}
		let index = idx % meta.sp.s_inodes_per_group;
		let table_blk = meta.gdt[group as usize].bg_inode_table as u64;
		let record_size = meta.sp.inode_record_size() as u64;
		Ok(table_blk * self.block_size as u64 + index as u64 * record_size)
	}

	/// Reads the 128-byte inode record for inode number `n`.
	pub(crate) fn read_inode(&self, n: u32) -> EResult<inode::Ext2INode> {
		let off = {
			let meta = self.meta.lock();
			self.inode_location(&meta, n)?
		};
		let dev = self.dev.lock();
		block_io::read_struct::<inode::Ext2INode>(&**dev, off)
	}

	/// Writes the 128-byte inode record for inode number `n`. Only those 128 bytes are
	/// touched, even when `s_inode_size` reports a larger on-disk record.
	pub(crate) fn write_inode(&self, n: u32, record: &inode::Ext2INode) -> EResult<()> {
		let off = {
			let meta = self.meta.lock();
			self.inode_location(&meta, n)?
		};
		let bytes = unsafe {
			core::slice::from_raw_parts(
				record as *const inode::Ext2INode as *const u8,
				size_of::<inode::Ext2INode>(),
			)
		};
		let mut dev = self.dev.lock();
		block_io::write_bytes(&mut **dev, off, bytes)?;
		dev.flush()
	}

	/// Returns a snapshot of the filesystem's usage and identification data.
	pub fn stats(&self) -> FsStats {
		let meta = self.meta.lock();
		FsStats {
			block_size: self.block_size,
			groups_count: self.groups_count,
			total_blocks: meta.sp.s_blocks_count,
			free_blocks: meta.sp.s_free_blocks_count,
			total_inodes: meta.sp.s_inodes_count,
			free_inodes: meta.sp.s_free_inodes_count,
			volume_label: meta.sp.s_volume_name,
			last_mount_path: meta.sp.s_last_mounted,
			state: meta.sp.s_state,
			rev_level: meta.sp.s_rev_level,
		}
	}

	pub(crate) fn config(&self) -> &DriverConfig {
		&self.config
	}
}
