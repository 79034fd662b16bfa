//! Maps the 9p server's VFS operation vector onto the shared image via
//! `sabfs-vfs`. Used for any guest file access that reaches the kernel
//! directly — paths outside the accelerated prefix, or syscalls the
//! classifier never claims — so both paths see the same filesystem.

use std::sync::Arc;

use sabfs_image::{DirEntry, Stat, StatFs};
use sabfs_vfs::{IoVec, IoVecMut, Vfs};

use crate::error::{NinepError, NinepResult};
use crate::path::name_to_path;

/// `unlinkat`'s flag requesting directory removal rather than unlink.
pub const AT_REMOVEDIR: i32 = 0x200;

pub struct NinepAdapter {
    vfs: Arc<Vfs>,
}

impl NinepAdapter {
    pub fn new(vfs: Arc<Vfs>) -> Self {
        NinepAdapter { vfs }
    }

    pub fn lstat(&self, path: &str) -> NinepResult<Stat> {
        Ok(self.vfs.image().lstat(path)?)
    }

    pub fn open(&self, path: &str, flags: i32, mode: u32) -> NinepResult<i32> {
        Ok(self.vfs.open(path, flags, mode)?)
    }

    pub fn opendir(&self, path: &str) -> NinepResult<i32> {
        Ok(self.vfs.open(path, libc::O_RDONLY | libc::O_DIRECTORY, 0)?)
    }

    /// Drains every remaining entry from the directory fd's current
    /// cursor to end-of-directory, matching a single coalesced 9p
    /// `Treaddir` response.
    pub fn readdir(&self, fd: i32) -> NinepResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.vfs.dir_next(fd)? {
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn preadv(&self, fd: i32, iovs: &mut [IoVecMut<'_>], offset: u64) -> NinepResult<usize> {
        Ok(self.vfs.preadv(fd, iovs, offset)?)
    }

    pub fn pwritev(&self, fd: i32, iovs: &[IoVec<'_>], offset: u64) -> NinepResult<usize> {
        Ok(self.vfs.pwritev(fd, iovs, offset)?)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> NinepResult<()> {
        Ok(self.vfs.mkdir(path, mode)?)
    }

    /// Non-regular node types (character/block devices, fifos, sockets)
    /// have no meaning inside an in-memory image; silently create a
    /// regular file instead of rejecting the call.
    pub fn mknod(&self, path: &str, _mode: u32, _dev: u64) -> NinepResult<()> {
        let fd = self.vfs.open(path, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o644)?;
        self.vfs.close(fd)?;
        Ok(())
    }

    pub fn symlink(&self, target: &str, link: &str) -> NinepResult<()> {
        Ok(self.vfs.symlink(target, link)?)
    }

    pub fn link(&self, old: &str, new: &str) -> NinepResult<()> {
        Ok(self.vfs.link(old, new)?)
    }

    pub fn readlink(&self, path: &str) -> NinepResult<String> {
        Ok(self.vfs.readlink(path)?)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> NinepResult<()> {
        Ok(self.vfs.chmod(path, mode)?)
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> NinepResult<()> {
        Ok(self.vfs.chown(path, uid, gid)?)
    }

    pub fn truncate(&self, path: &str, length: u64) -> NinepResult<()> {
        Ok(self.vfs.truncate(path, length)?)
    }

    pub fn rename(&self, old: &str, new: &str) -> NinepResult<()> {
        Ok(self.vfs.rename(old, new)?)
    }

    pub fn renameat(&self, old_dir: &str, old_name: &str, new_dir: &str, new_name: &str) -> NinepResult<()> {
        let old = name_to_path(old_dir, old_name);
        let new = name_to_path(new_dir, new_name);
        self.rename(&old, &new)
    }

    pub fn unlinkat(&self, dir: &str, name: &str, flags: i32) -> NinepResult<()> {
        let path = name_to_path(dir, name);
        if flags & AT_REMOVEDIR != 0 {
            Ok(self.vfs.rmdir(&path)?)
        } else {
            Ok(self.vfs.unlink(&path)?)
        }
    }

    pub fn utimensat(&self, path: &str, atime: i64, mtime: i64) -> NinepResult<()> {
        Ok(self.vfs.utimes(path, atime, mtime)?)
    }

    /// The image lives entirely in memory; there is nothing to flush.
    pub fn fsync(&self, _fd: i32) -> NinepResult<()> {
        Ok(())
    }

    pub fn statfs(&self) -> StatFs {
        self.vfs.statfs()
    }

    pub fn name_to_path(&self, dir: &str, name: &str) -> String {
        name_to_path(dir, name)
    }

    pub fn getxattr(&self, _path: &str, _name: &str) -> NinepResult<Vec<u8>> {
        Err(NinepError::NotSupported)
    }

    pub fn setxattr(&self, _path: &str, _name: &str, _value: &[u8]) -> NinepResult<()> {
        Err(NinepError::NotSupported)
    }

    pub fn listxattr(&self, _path: &str) -> NinepResult<Vec<String>> {
        Err(NinepError::NotSupported)
    }

    pub fn removexattr(&self, _path: &str, _name: &str) -> NinepResult<()> {
        Err(NinepError::NotSupported)
    }
}
