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

//! Builds tiny, single-block-group ext2 images in memory for this module's own tests.
//!
//! There is no `mkfs` in scope for this driver (formatting a volume is host tooling, not
//! something this crate offers), so every test that needs a mounted filesystem goes through
//! [`format_ramdisk`] instead of depending on a prebuilt disk image fixture.

use super::{MAGIC, MODE_DIRECTORY, Superblock, bgd::BlockGroupDescriptor};
use crate::device::{RamDisk, SECTOR_SIZE};

/// Builds a `total_bytes`-sized ramdisk, formatted as a single-block-group ext2 volume with
/// `block_size` bytes per block, whose root directory (inode 2) already contains `.` and
/// `..`.
///
/// `total_bytes` must be small enough that every block and inode bitmap fits in one block
/// (true for every size this crate's tests use); larger or multi-group images are outside
/// what this helper needs to support.
pub(crate) fn format_ramdisk(total_bytes: usize, block_size: u32) -> RamDisk {
	assert!(total_bytes % SECTOR_SIZE == 0);
	assert!(matches!(block_size, 1024 | 2048 | 4096));
	let mut disk = RamDisk::new(total_bytes);
	let blocks_count = (total_bytes / block_size as usize) as u32;
	let first_data_block: u32 = if block_size == 1024 {
		1
	} else {
		0
	};
	let blocks_per_group = blocks_count - first_data_block;
	assert!(blocks_per_group <= block_size * 8, "test image needs a second block group");

	let inodes_count = (blocks_count / 4).clamp(32, 4096);
	let gdt_start_block: u32 = if block_size == 1024 {
		2
	} else {
		1
	};
	let gdt_blocks = 1u32;
	let block_bitmap_blk = gdt_start_block + gdt_blocks;
	let inode_bitmap_blk = block_bitmap_blk + 1;
	let inode_table_blk = inode_bitmap_blk + 1;
	let inode_table_blocks = (inodes_count * 128).div_ceil(block_size);
	let first_free_block = inode_table_blk + inode_table_blocks;
	let root_dir_block = first_free_block;
	let data_start = root_dir_block + 1;
	let used_block_bits = data_start - first_data_block;

	let write_block = |disk: &mut RamDisk, blk: u32, data: &[u8]| {
		let off = blk as usize * block_size as usize;
		disk.as_bytes_mut()[off..off + data.len()].copy_from_slice(data);
	};

	// Block bitmap: the metadata and root-directory blocks computed above, then free.
	let mut block_bitmap = alloc::vec![0u8; block_size as usize];
	for bit in 0..used_block_bits {
		block_bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
	}
	write_block(&mut disk, block_bitmap_blk, &block_bitmap);

	// Inode bitmap: inode 1 (reserved) and inode 2 (root) used, the rest free.
	let mut inode_bitmap = alloc::vec![0u8; block_size as usize];
	inode_bitmap[0] = 0b0000_0011;
	write_block(&mut disk, inode_bitmap_blk, &inode_bitmap);

	// Inode table: every record zero except inode 2, the root directory.
	let mut root_inode = [0u8; 128];
	root_inode[0..2].copy_from_slice(&(MODE_DIRECTORY | 0o755).to_le_bytes()); // i_mode
	root_inode[4..8].copy_from_slice(&block_size.to_le_bytes()); // i_size
	root_inode[26..28].copy_from_slice(&2u16.to_le_bytes()); // i_links_count
	root_inode[28..32].copy_from_slice(&(block_size / 512).to_le_bytes()); // i_blocks
	root_inode[40..44].copy_from_slice(&root_dir_block.to_le_bytes()); // i_block[0]
	let mut table = alloc::vec![0u8; inode_table_blocks as usize * block_size as usize];
	table[128..256].copy_from_slice(&root_inode);
	for (i, chunk) in table.chunks(block_size as usize).enumerate() {
		write_block(&mut disk, inode_table_blk + i as u32, chunk);
	}

	// Root directory content: `.` then `..`, both pointing at inode 2 (the root is its own
	// parent).
	let mut root_block = alloc::vec![0u8; block_size as usize];
	root_block[0..4].copy_from_slice(&2u32.to_le_bytes());
	root_block[4..6].copy_from_slice(&12u16.to_le_bytes());
	root_block[6] = 1;
	root_block[7] = 2; // directory
	root_block[8] = b'.';
	root_block[12..16].copy_from_slice(&2u32.to_le_bytes());
	root_block[16..18].copy_from_slice(&((block_size - 12) as u16).to_le_bytes());
	root_block[18] = 2;
	root_block[19] = 2;
	root_block[20] = b'.';
	root_block[21] = b'.';
	write_block(&mut disk, root_dir_block, &root_block);

	// Group descriptor.
	let free_blocks = blocks_per_group - used_block_bits;
	let bgd = BlockGroupDescriptor {
		bg_block_bitmap: block_bitmap_blk,
		bg_inode_bitmap: inode_bitmap_blk,
		bg_inode_table: inode_table_blk,
		bg_free_blocks_count: free_blocks as u16,
		bg_free_inodes_count: (inodes_count - 2) as u16,
		bg_used_dirs_count: 1,
		bg_pad: [0; 14],
	};
	let bgd_bytes = unsafe {
		core::slice::from_raw_parts(
			&bgd as *const BlockGroupDescriptor as *const u8,
			BlockGroupDescriptor::SIZE,
		)
	};
	write_block(&mut disk, gdt_start_block, bgd_bytes);

	// Superblock.
	let mut sp: Superblock = unsafe { core::mem::zeroed() };
	sp.s_inodes_count = inodes_count;
	sp.s_blocks_count = blocks_count;
	sp.s_free_blocks_count = free_blocks;
	sp.s_free_inodes_count = inodes_count - 2;
	sp.s_first_data_block = first_data_block;
	sp.s_log_block_size = (block_size / 1024).trailing_zeros();
	sp.s_log_frag_size = sp.s_log_block_size;
	sp.s_blocks_per_group = blocks_per_group;
	sp.s_frags_per_group = blocks_per_group;
	sp.s_inodes_per_group = inodes_count;
	sp.s_magic = MAGIC;
	sp.s_state = 1;
	sp.s_rev_level = 0;
	sp.s_inode_size = 128;
	sp.s_first_ino = 11;
	let sp_bytes = unsafe {
		core::slice::from_raw_parts(&sp as *const Superblock as *const u8, size_of::<Superblock>())
	};
	disk.as_bytes_mut()[1024..1024 + sp_bytes.len()].copy_from_slice(sp_bytes);

	disk
}
