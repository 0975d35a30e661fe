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

//! Reading and writing a file's content through the block map translator.
//!
//! Neither direction here ever indexes `inode.i_block[]` directly: both walk logical blocks
//! and hand each one to [`Ext2Fs::translate_block`] or [`Ext2Fs::alloc_block_for`], which are
//! the sole authority on the direct/indirect/double-indirect tree shape.

use super::{Ext2Fs, inode::Ext2INode};
use utils::errno::EResult;

impl Ext2Fs {
	/// Reads up to `dst.len()` bytes of `inode`'s content starting at byte `offset`.
	///
	/// Never extends the file: the read is first clamped to what remains between `offset`
	/// and `inode.i_size`. Logical ranges that were never written (sparse holes) come back as
	/// zero bytes rather than triggering an allocation. Returns the number of bytes actually
	/// copied, which may be less than `dst.len()` at end of file.
	pub fn read_file(&self, inode: &Ext2INode, offset: u64, dst: &mut [u8]) -> EResult<usize> {
		let size = inode.i_size as u64;
		if offset >= size {
			return Ok(0);
		}
		let avail = (size - offset).min(dst.len() as u64) as usize;
		let dst = &mut dst[..avail];
		let block_size = self.block_size() as u64;
		let mut done = 0;
		let mut buf = self.new_block_buf();
		while done < avail {
			let pos = offset + done as u64;
			let l = (pos / block_size) as u32;
			let inner = (pos % block_size) as usize;
			let chunk = (block_size as usize - inner).min(avail - done);
			let phys = self.translate_block(inode, l)?;
			if phys == 0 {
				dst[done..done + chunk].fill(0);
			} else {
				self.read_block(phys, &mut buf)?;
				dst[done..done + chunk].copy_from_slice(&buf[inner..inner + chunk]);
			}
			done += chunk;
		}
		Ok(done)
	}

	/// Writes `src` into `inode`'s content starting at byte `offset`, allocating blocks as
	/// needed and extending `inode.i_size` when the write reaches past the current end.
	///
	/// Partial blocks (a non-aligned `offset`, or a short tail) are read-modify-written so
	/// neighboring bytes already on disk survive. Timestamps and the inode record itself are
	/// persisted before returning. If a later block's allocation fails, the write stops there
	/// and the bytes written so far are still reported (with `i_size` and timestamps updated to
	/// match), matching the "no rollback" policy for this non-journaled driver; the error is
	/// only propagated when nothing was written at all.
	pub fn write_file(
		&self,
		inode_num: u32,
		inode: &mut Ext2INode,
		offset: u64,
		src: &[u8],
	) -> EResult<usize> {
		let block_size = self.block_size() as u64;
		let mut done = 0;
		let mut buf = self.new_block_buf();
		let mut stop: Option<utils::errno::Errno> = None;
		while done < src.len() {
			let pos = offset + done as u64;
			let l = (pos / block_size) as u32;
			let inner = (pos % block_size) as usize;
			let chunk = (block_size as usize - inner).min(src.len() - done);
			let phys = match self.alloc_block_for(inode, l) {
				Ok(phys) => phys,
				Err(e) => {
					stop = Some(e);
					break;
				}
			};
			let partial = inner != 0 || chunk != block_size as usize;
			if partial {
				self.read_block(phys, &mut buf)?;
			}
			buf[inner..inner + chunk].copy_from_slice(&src[done..done + chunk]);
			self.write_block(phys, &buf)?;
			done += chunk;
		}
		if let Some(e) = stop {
			if done == 0 {
				return Err(e);
			}
		}
		let end = offset + done as u64;
		if end > inode.i_size as u64 {
			inode.i_size = end as u32;
		}
		let now = self.config.clock.now_sec();
		inode.i_mtime = now;
		inode.i_ctime = now;
		self.write_inode(inode_num, inode)?;
		Ok(done)
	}
}
