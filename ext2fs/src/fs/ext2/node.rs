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

//! Directory contents (component I) and the node handles delivered to the consumer above
//! this driver (component J): mount, create, unlink, lookup, iteration, and stats.
//!
//! A directory's payload is scanned and mutated only through its direct data blocks; this
//! driver never grows a directory into its indirect blocks, matching the ceiling the spec
//! draws around directory storage.

use super::{
	Ext2Fs, FileType, FsStats, MODE_DIRECTORY, MODE_REGULAR, ROOT_INODE, Stat,
	dirent::{ALIGN, Dirent, NAME_OFF},
	inode::{DIRECT_BLOCKS_COUNT, Ext2INode},
};
use alloc::{sync::Arc, vec::Vec};
use utils::{errno, errno::EResult, limits::NAME_MAX, math::align_up};

/// One directory entry as handed back by [`Node::readdir`]: owned, since this driver has no
/// shared scratch buffer whose lifetime it can tie a borrow to across the vtable boundary.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: Vec<u8>,
	pub inode: u32,
	pub file_type: Option<FileType>,
}

/// A live reference to one file or directory on a mounted volume.
///
/// Forms a tree through [`Self::parent`]; that link is non-owning (an `Arc` only because
/// Rust's ownership model has no cheaper way to express "weak reference used solely for path
/// composition" without the caller juggling lifetimes across the vtable boundary — see the
/// crate-level design notes). It is never consulted to decide when a node's storage is freed;
/// only `unlink` and the bitmap allocators do that.
pub struct Node {
	fs: Arc<Ext2Fs>,
	pub name: Vec<u8>,
	pub inode: u32,
	pub file_type: FileType,
	pub mode: u16,
	pub uid: u16,
	pub gid: u16,
	pub parent: Option<Arc<Node>>,
}

impl Node {
	/// Reads up to `buf.len()` bytes starting at `offset`. Never valid for a directory.
	pub fn read(&self, offset: u64, buf: &mut [u8]) -> EResult<usize> {
		if self.file_type != FileType::Regular {
			return Err(errno!(EISDIR));
		}
		let inode = self.fs.read_inode(self.inode)?;
		self.fs.read_file(&inode, offset, buf)
	}

	/// Writes `buf` starting at `offset`, extending the file and allocating blocks as needed.
	/// Never valid for a directory.
	pub fn write(&self, offset: u64, buf: &[u8]) -> EResult<usize> {
		if self.file_type != FileType::Regular {
			return Err(errno!(EISDIR));
		}
		let mut inode = self.fs.read_inode(self.inode)?;
		self.fs.write_file(self.inode, &mut inode, offset, buf)
	}

	/// Returns the `index`-th live entry of this directory (skipping tombstones), or `None`
	/// past the last one.
	pub fn readdir(&self, index: usize) -> EResult<Option<DirEntry>> {
		if self.file_type != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		let inode = self.fs.read_inode(self.inode)?;
		self.fs.readdir_nth(&inode, index)
	}

	/// Looks up `name` in this directory and returns a fresh handle for it, parented to
	/// `self`. Returns `None` on a miss.
	pub fn finddir(self: &Arc<Self>, name: &[u8]) -> EResult<Option<Arc<Node>>> {
		if self.file_type != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		let inode = self.fs.read_inode(self.inode)?;
		let Some((child_num, _)) = self.fs.find_dirent(&inode, name)? else {
			return Ok(None);
		};
		let child = self.fs.read_inode(child_num)?;
		let file_type = child.file_type().ok_or(errno!(EUCLEAN))?;
		Ok(Some(Arc::new(Node {
			fs: self.fs.clone(),
			name: name.to_vec(),
			inode: child_num,
			file_type,
			mode: child.i_mode,
			uid: child.i_uid,
			gid: child.i_gid,
			parent: Some(self.clone()),
		})))
	}

	/// Returns a snapshot of this node's metadata.
	pub fn stat(&self) -> EResult<Stat> {
		let inode = self.fs.read_inode(self.inode)?;
		Ok(Stat {
			mode: inode.i_mode,
			uid: inode.i_uid,
			gid: inode.i_gid,
			size: inode.i_size,
			blocks: inode.i_blocks,
			nlink: inode.i_links_count,
			atime: inode.i_atime,
			mtime: inode.i_mtime,
			ctime: inode.i_ctime,
		})
	}

	/// Returns the volume's usage and identification data.
	pub fn fs_stats(&self) -> FsStats {
		self.fs.stats()
	}
}

impl Ext2Fs {
	/// Returns the root node (inode 2) of this mounted volume.
	pub fn root(self: &Arc<Self>) -> EResult<Arc<Node>> {
		let inode = self.read_inode(ROOT_INODE)?;
		let file_type = inode.file_type().ok_or(errno!(EUCLEAN))?;
		if file_type != FileType::Directory {
			return Err(errno!(EUCLEAN));
		}
		Ok(Arc::new(Node {
			fs: self.clone(),
			name: Vec::new(),
			inode: ROOT_INODE,
			file_type,
			mode: inode.i_mode,
			uid: inode.i_uid,
			gid: inode.i_gid,
			parent: None,
		}))
	}

	/// Creates an empty regular file named `name` in `parent` and returns a handle to it.
	pub fn create_file(self: &Arc<Self>, parent: &Arc<Node>, name: &[u8]) -> EResult<Arc<Node>> {
		self.create_entry(parent, name, FileType::Regular)
	}

	/// Creates an empty directory named `name` in `parent`, seeded with `.` and `..`, and
	/// returns a handle to it.
	pub fn create_dir(self: &Arc<Self>, parent: &Arc<Node>, name: &[u8]) -> EResult<Arc<Node>> {
		self.create_entry(parent, name, FileType::Directory)
	}

	fn create_entry(
		self: &Arc<Self>,
		parent: &Arc<Node>,
		name: &[u8],
		file_type: FileType,
	) -> EResult<Arc<Node>> {
		if parent.file_type != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		let mut parent_inode = self.read_inode(parent.inode)?;
		// Not named as a distinct error kind in the spec's closed error set; `EINVAL` is the
		// nearest boundary failure indicator for "the name is already taken".
		if self.find_dirent(&parent_inode, name)?.is_some() {
			return Err(errno!(EINVAL));
		}
		let now = self.config.clock.now_sec();
		let is_dir = file_type == FileType::Directory;
		let child_num = self.alloc_inode(is_dir)?;
		let mut child = Ext2INode::new();
		child.i_mode = if is_dir {
			MODE_DIRECTORY | 0o755
		} else {
			MODE_REGULAR | 0o644
		};
		child.i_atime = now;
		child.i_ctime = now;
		child.i_mtime = now;
		if is_dir {
			let blk = self.write_new_dir_block(child_num, parent.inode)?;
			child.i_block[0] = blk;
			child.i_size = self.block_size();
			child.i_blocks = self.sectors_per_block();
			child.i_links_count = 2;
			parent_inode.i_links_count += 1;
		} else {
			child.i_links_count = 1;
		}
		self.write_inode(child_num, &child)?;
		if let Err(e) = self.add_dirent(&mut parent_inode, child_num, name, file_type) {
			// Roll back the inode and any data block already allocated for it (the `.`/`..`
			// payload of a directory); leaving either marked used with no directory entry
			// pointing at them would otherwise leak them permanently.
			self.free_all_blocks(&mut child)?;
			self.free_inode(child_num, is_dir)?;
			return Err(e);
		}
		self.write_inode(parent.inode, &parent_inode)?;
		Ok(Arc::new(Node {
			fs: self.clone(),
			name: name.to_vec(),
			inode: child_num,
			file_type,
			mode: child.i_mode,
			uid: child.i_uid,
			gid: child.i_gid,
			parent: Some(parent.clone()),
		}))
	}

	/// Removes `name` from `parent`. Refuses directories: this driver does not offer rmdir.
	///
	/// Decrements the child's link count; when it reaches zero, stamps the deletion time,
	/// frees its data blocks, and frees the inode itself. Either way, the parent's directory
	/// entry is removed.
	pub fn unlink(&self, parent: &Arc<Node>, name: &[u8]) -> EResult<()> {
		if parent.file_type != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		let mut parent_inode = self.read_inode(parent.inode)?;
		let Some((child_num, child_type)) = self.find_dirent(&parent_inode, name)? else {
			return Err(errno!(ENOENT));
		};
		if child_type == Some(FileType::Directory) {
			return Err(errno!(ENOTSUP));
		}
		let mut child = self.read_inode(child_num)?;
		child.i_links_count = child.i_links_count.saturating_sub(1);
		if child.i_links_count == 0 {
			child.i_dtime = self.config.clock.now_sec();
			self.free_all_blocks(&mut child)?;
			self.write_inode(child_num, &child)?;
			self.free_inode(child_num, false)?;
		} else {
			self.write_inode(child_num, &child)?;
		}
		self.remove_dirent(&mut parent_inode, name)?;
		self.write_inode(parent.inode, &parent_inode)?;
		Ok(())
	}

	/// Allocates a fresh data block holding `.` (pointing at `self_inode`) and `..` (pointing
	/// at `parent_inode`), the standard seed for a new directory's payload.
	fn write_new_dir_block(&self, self_inode: u32, parent_inode: u32) -> EResult<u32> {
		let block_size = self.block_size();
		let blk = self.alloc_block()?;
		let mut buf = self.new_block_buf();
		Dirent::write_new(&mut buf, self_inode, 12, Some(FileType::Directory), b".")?;
		Dirent::write_new(
			&mut buf[12..],
			parent_inode,
			(block_size - 12) as u16,
			Some(FileType::Directory),
			b"..",
		)?;
		self.write_block(blk, &buf)?;
		Ok(blk)
	}

	/// Scans `dir`'s direct data blocks for an entry named `name`.
	pub(crate) fn find_dirent(
		&self,
		dir: &Ext2INode,
		name: &[u8],
	) -> EResult<Option<(u32, Option<FileType>)>> {
		let mut found = None;
		self.scan_dirents(dir, |_blk, _off, ent| {
			if !ent.is_free() && ent.get_name() == name {
				found = Some((ent.inode, ent.get_type()));
				false
			} else {
				true
			}
		})?;
		Ok(found)
	}

	/// Returns the `index`-th live (non-tombstoned, non-empty-named) entry of `dir`.
	pub(crate) fn readdir_nth(&self, dir: &Ext2INode, index: usize) -> EResult<Option<DirEntry>> {
		let mut count = 0usize;
		let mut found = None;
		self.scan_dirents(dir, |_blk, _off, ent| {
			if ent.is_free() || ent.get_name().is_empty() {
				return true;
			}
			if count == index {
				found = Some(DirEntry {
					name: ent.get_name().to_vec(),
					inode: ent.inode,
					file_type: ent.get_type(),
				});
				return false;
			}
			count += 1;
			true
		})?;
		Ok(found)
	}

	/// Walks every record of every direct data block of `dir`, calling `f(block_number,
	/// in-block offset, entry)` for each. `f` returns whether to keep scanning.
	///
	/// A `rec_len` of zero, or a block pointer slot of zero, ends the scan early, per the
	/// spec's directory iteration rule.
	fn scan_dirents(
		&self,
		dir: &Ext2INode,
		mut f: impl FnMut(u32, usize, &Dirent) -> bool,
	) -> EResult<()> {
		let mut buf = self.new_block_buf();
		for slot in 0..DIRECT_BLOCKS_COUNT {
			let blk_num = dir.i_block[slot];
			if blk_num == 0 {
				break;
			}
			self.read_block(blk_num, &mut buf)?;
			let mut off = 0usize;
			while off < buf.len() {
				let rec_len = Dirent::from_slice(&mut buf[off..])?.rec_len as usize;
				if rec_len == 0 {
					break;
				}
				let keep_going = f(blk_num, off, Dirent::from_slice(&mut buf[off..])?);
				if !keep_going {
					return Ok(());
				}
				off += rec_len;
			}
		}
		Ok(())
	}

	/// Adds a directory entry for `child_inode` named `name` into `dir`, splitting an
	/// existing record's free tail or reusing a tombstone when there is room, and otherwise
	/// allocating a fresh data block for a new direct slot.
	///
	/// Does not extend into indirect blocks: once all twelve direct slots are occupied and
	/// none has room, this returns [`utils::errno::Errno::ENOSPC`].
	pub(crate) fn add_dirent(
		&self,
		dir: &mut Ext2INode,
		child_inode: u32,
		name: &[u8],
		file_type: FileType,
	) -> EResult<()> {
		if name.len() > NAME_MAX {
			return Err(errno!(ENAMETOOLONG));
		}
		let block_size = self.block_size();
		let need = align_up(NAME_OFF + name.len(), ALIGN) as u32;
		if need > block_size {
			return Err(errno!(ENAMETOOLONG));
		}
		let mut buf = self.new_block_buf();
		for slot in 0..DIRECT_BLOCKS_COUNT {
			if dir.i_block[slot] == 0 {
				let blk = self.alloc_block()?;
				Dirent::write_new(&mut buf, child_inode, block_size as u16, Some(file_type), name)?;
				self.write_block(blk, &buf)?;
				dir.i_block[slot] = blk;
				dir.i_size += block_size;
				dir.i_blocks += self.sectors_per_block();
				return Ok(());
			}
			let blk_num = dir.i_block[slot];
			self.read_block(blk_num, &mut buf)?;
			let mut off = 0usize;
			while off < buf.len() {
				let (rec_len, is_free, name_len) = {
					let ent = Dirent::from_slice(&mut buf[off..])?;
					(ent.rec_len as usize, ent.is_free(), ent.get_name().len())
				};
				if rec_len == 0 {
					break;
				}
				if is_free {
					if rec_len as u32 >= need {
						Dirent::write_new(
							&mut buf[off..],
							child_inode,
							rec_len as u16,
							Some(file_type),
							name,
						)?;
						self.write_block(blk_num, &buf)?;
						return Ok(());
					}
				} else {
					let actual = align_up(NAME_OFF + name_len, ALIGN);
					if rec_len >= actual && (rec_len - actual) as u32 >= need {
						{
							let ent = Dirent::from_slice(&mut buf[off..])?;
							ent.rec_len = actual as u16;
						}
						let tail_off = off + actual;
						let tail_len = (rec_len - actual) as u16;
						Dirent::write_new(&mut buf[tail_off..], child_inode, tail_len, Some(file_type), name)?;
						self.write_block(blk_num, &buf)?;
						return Ok(());
					}
				}
				off += rec_len;
			}
		}
		Err(errno!(ENOSPC))
	}

	/// Removes the entry named `name` from `dir`'s direct data blocks.
	///
	/// The first record in a block is tombstoned in place (`inode` zeroed, `rec_len` kept so
	/// the block's records still sum to exactly the block size); any other record is absorbed
	/// into the `rec_len` of the record immediately before it.
	pub(crate) fn remove_dirent(&self, dir: &mut Ext2INode, name: &[u8]) -> EResult<()> {
		let mut buf = self.new_block_buf();
		for slot in 0..DIRECT_BLOCKS_COUNT {
			let blk_num = dir.i_block[slot];
			if blk_num == 0 {
				break;
			}
			self.read_block(blk_num, &mut buf)?;
			let mut off = 0usize;
			let mut prev_off: Option<usize> = None;
			while off < buf.len() {
				let rec_len = Dirent::from_slice(&mut buf[off..])?.rec_len as usize;
				if rec_len == 0 {
					break;
				}
				let matched = {
					let ent = Dirent::from_slice(&mut buf[off..])?;
					!ent.is_free() && ent.get_name() == name
				};
				if matched {
					if let Some(prev) = prev_off {
						let extra = rec_len as u16;
						let prev_ent = Dirent::from_slice(&mut buf[prev..])?;
						prev_ent.rec_len += extra;
					} else {
						let ent = Dirent::from_slice(&mut buf[off..])?;
						ent.inode = 0;
					}
					self.write_block(blk_num, &buf)?;
					return Ok(());
				}
				prev_off = Some(off);
				off += rec_len;
			}
		}
		Err(errno!(ENOENT))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{config::DriverConfig, fs::ext2::test_util::format_ramdisk};

	fn mount(total_bytes: usize, block_size: u32) -> Arc<Ext2Fs> {
		let disk = format_ramdisk(total_bytes, block_size);
		Ext2Fs::mount(alloc::boxed::Box::new(disk), DriverConfig::default()).unwrap()
	}

	#[test]
	fn root_is_a_directory_with_dot_and_dotdot() {
		let fs = mount(1024 * 1024, 1024);
		let root = fs.root().unwrap();
		assert_eq!(root.file_type, FileType::Directory);
		let a = root.readdir(0).unwrap().unwrap();
		let b = root.readdir(1).unwrap().unwrap();
		let names: alloc::vec::Vec<_> = [a.name, b.name].into_iter().collect();
		assert!(names.contains(&b".".to_vec()));
		assert!(names.contains(&b"..".to_vec()));
		assert!(root.readdir(2).unwrap().is_none());
	}

	#[test]
	fn create_file_then_finddir_then_read_back() {
		let fs = mount(1024 * 1024, 1024);
		let root = fs.root().unwrap();
		let f = fs.create_file(&root, b"a").unwrap();
		f.write(0, b"ABC").unwrap();
		let found = root.finddir(b"a").unwrap().unwrap();
		let mut buf = [0u8; 3];
		found.read(0, &mut buf).unwrap();
		assert_eq!(&buf, b"ABC");
		assert_eq!(found.stat().unwrap().size, 3);
	}

	#[test]
	fn create_dir_then_populate_then_unlink() {
		let fs = mount(2 * 1024 * 1024, 1024);
		let root = fs.root().unwrap();
		let d = fs.create_dir(&root, b"d").unwrap();
		let stats_before = d.fs_stats();
		let x = fs.create_file(&d, b"x").unwrap();
		x.write(0, b"hi").unwrap();
		fs.unlink(&d, b"x").unwrap();
		assert!(d.finddir(b"x").unwrap().is_none());
		assert!(fs.unlink(&d, b"x").is_err());
		let a = d.readdir(0).unwrap().unwrap();
		let b = d.readdir(1).unwrap().unwrap();
		assert!(d.readdir(2).unwrap().is_none());
		let names: alloc::vec::Vec<_> = [a.name, b.name].into_iter().collect();
		assert!(names.contains(&b".".to_vec()));
		assert!(names.contains(&b"..".to_vec()));
		let stats_after = d.fs_stats();
		assert_eq!(stats_before.free_blocks, stats_after.free_blocks);
		assert_eq!(stats_before.free_inodes, stats_after.free_inodes);
	}

	#[test]
	fn unlink_refuses_directories() {
		let fs = mount(1024 * 1024, 1024);
		let root = fs.root().unwrap();
		fs.create_dir(&root, b"d").unwrap();
		assert!(fs.unlink(&root, b"d").is_err());
	}

	#[test]
	fn create_stamps_timestamps_from_the_configured_clock() {
		let disk = format_ramdisk(1024 * 1024, 1024);
		let clock = alloc::sync::Arc::new(crate::time::TickClock::new());
		clock.set(1_700_000_000);
		let config = DriverConfig {
			clock: clock.clone(),
			..DriverConfig::default()
		};
		let fs = Ext2Fs::mount(alloc::boxed::Box::new(disk), config).unwrap();
		let root = fs.root().unwrap();
		let f = fs.create_file(&root, b"a").unwrap();
		let stat = f.stat().unwrap();
		assert_eq!(stat.ctime, 1_700_000_000);
		assert_eq!(stat.mtime, 1_700_000_000);

		clock.set(1_700_000_500);
		f.write(0, b"hi").unwrap();
		assert_eq!(f.stat().unwrap().mtime, 1_700_000_500);
	}
}
