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

//! Byte- and block-granularity I/O over a sector-only [`BlockDevice`].
//!
//! Neither layer here caches anything: every call touches the device, and every block write
//! is followed by a flush. That is more I/O than a page-cached driver would do, and it is
//! deliberate — it is what lets every other layer assume that once a call returns, the bytes
//! it wrote are as durable as the device underneath makes them.

use crate::device::{BlockDevice, SECTOR_SIZE};
use core::mem::MaybeUninit;
use utils::{errno, errno::EResult, repr::AnyRepr};

/// Reads `buf.len()` bytes starting at byte offset `offset` on the device.
///
/// Handles sub-sector offsets and lengths by reading the covering sectors and slicing out the
/// requested range.
pub fn read_bytes(dev: &dyn BlockDevice, offset: u64, buf: &mut [u8]) -> EResult<()> {
	if buf.is_empty() {
		return Ok(());
	}
	let start_sector = offset / SECTOR_SIZE as u64;
	let end = offset + buf.len() as u64;
	let end_sector = end.div_ceil(SECTOR_SIZE as u64);
	let sector_span = (end_sector - start_sector) as usize;
	let mut scratch = alloc::vec![0u8; sector_span * SECTOR_SIZE];
	dev.read(start_sector, &mut scratch)?;
	let skip = (offset - start_sector * SECTOR_SIZE as u64) as usize;
	buf.copy_from_slice(&scratch[skip..skip + buf.len()]);
	Ok(())
}

/// Writes `buf.len()` bytes starting at byte offset `offset` on the device.
///
/// Any sector only partially covered by `buf` (a non-sector-aligned offset, or a length that
/// leaves a short tail) is read back first so the write does not clobber the rest of that
/// sector.
pub fn write_bytes(dev: &mut dyn BlockDevice, offset: u64, buf: &[u8]) -> EResult<()> {
	if buf.is_empty() {
		return Ok(());
	}
	let start_sector = offset / SECTOR_SIZE as u64;
	let end = offset + buf.len() as u64;
	let end_sector = end.div_ceil(SECTOR_SIZE as u64);
	let sector_span = (end_sector - start_sector) as usize;
	let span_bytes = sector_span * SECTOR_SIZE;
	let skip = (offset - start_sector * SECTOR_SIZE as u64) as usize;
	let mut scratch = alloc::vec![0u8; span_bytes];
	let partial_head = skip != 0;
	let partial_tail = (skip + buf.len()) % SECTOR_SIZE != 0;
	if partial_head || partial_tail {
		dev.read(start_sector, &mut scratch)?;
	}
	scratch[skip..skip + buf.len()].copy_from_slice(buf);
	dev.write(start_sector, &scratch)
}

/// Reads an on-disk structure of type `T` at byte offset `offset` on the device.
///
/// Reads into a `MaybeUninit<T>` rather than a `[u8; size_of::<T>()]` scratch buffer so the
/// bytes land at `T`'s required alignment (a stack byte array only guarantees alignment 1);
/// `T: AnyRepr` is what makes `assume_init` sound once every byte has been written by the read.
pub fn read_struct<T: AnyRepr>(dev: &dyn BlockDevice, offset: u64) -> EResult<T> {
	let mut obj = MaybeUninit::<T>::uninit();
	let buf = unsafe { core::slice::from_raw_parts_mut(obj.as_mut_ptr() as *mut u8, size_of::<T>()) };
	read_bytes(dev, offset, buf)?;
	Ok(unsafe { obj.assume_init() })
}

/// Reads exactly one filesystem block of `block_size` bytes.
///
/// Block 0 and out-of-range block numbers are not validated here; callers that need that
/// check (the superblock, the bitmap allocators, the block map translator) perform it
/// themselves, since the valid range depends on filesystem state this layer does not have.
pub fn read_block(dev: &dyn BlockDevice, block_size: u32, blk: u32, buf: &mut [u8]) -> EResult<()> {
	if buf.len() != block_size as usize {
		return Err(errno!(EINVAL));
	}
	read_bytes(dev, blk as u64 * block_size as u64, buf)
}

/// Writes exactly one filesystem block of `block_size` bytes, then flushes the device.
pub fn write_block(
	dev: &mut dyn BlockDevice,
	block_size: u32,
	blk: u32,
	buf: &[u8],
) -> EResult<()> {
	if buf.len() != block_size as usize {
		return Err(errno!(EINVAL));
	}
	write_bytes(dev, blk as u64 * block_size as u64, buf)?;
	dev.flush()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::RamDisk;

	#[test]
	fn byte_io_handles_unaligned_ranges() {
		let mut disk = RamDisk::new(SECTOR_SIZE * 4);
		write_bytes(&mut disk, 100, &[0x42u8; 50]).unwrap();
		let mut buf = [0u8; 50];
		read_bytes(&disk, 100, &mut buf).unwrap();
		assert_eq!(buf, [0x42u8; 50]);
		// Neighboring bytes in the same sector must be untouched.
		let mut around = [0u8; 100];
		read_bytes(&disk, 0, &mut around).unwrap();
		assert!(around.iter().all(|&b| b == 0));
	}

	#[test]
	fn block_io_round_trips_a_full_block() {
		let mut disk = RamDisk::new(4096 * 2);
		let data: alloc::vec::Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
		write_block(&mut disk, 1024, 1, &data).unwrap();
		let mut out = alloc::vec![0u8; 1024];
		read_block(&disk, 1024, 1, &mut out).unwrap();
		assert_eq!(out, data);
	}

	#[derive(macros::AnyRepr, Debug, Clone, Copy, PartialEq, Eq)]
	#[repr(C)]
	struct Aligned4 {
		a: u8,
		b: u32,
	}

	#[test]
	fn read_struct_is_sound_at_every_byte_offset() {
		// A misaligned source offset is exactly the case that would have broken the old
		// stack-array-plus-`from_bytes` approach: the destination buffer it read into only
		// guaranteed alignment 1, so whether the read actually worked depended on where the
		// compiler happened to place that array on the stack.
		let mut disk = RamDisk::new(SECTOR_SIZE * 2);
		let want = Aligned4 { a: 7, b: 0xDEAD_BEEF };
		let bytes = unsafe {
			core::slice::from_raw_parts(&want as *const Aligned4 as *const u8, size_of::<Aligned4>())
		};
		for offset in 0..8u64 {
			write_bytes(&mut disk, offset, bytes).unwrap();
			let got: Aligned4 = read_struct(&disk, offset).unwrap();
			assert_eq!(got, want);
		}
	}
}
