//! POSIX-shaped operations over the shared image, used by both the
//! syscall dispatcher and the 9p adapter.

use std::sync::{Arc, Mutex};

use sabfs_image::{DirEntry, Image, SabfsError, Stat, StatFs};

use crate::error::{VfsError, VfsResult};
use crate::fd::{FdTable, Handle, ELF_CACHE_FD_BASE, SABFS_FD_BASE};

/// A mutable scatter/gather buffer slice, mirroring a POSIX `iovec`.
pub struct IoVecMut<'a>(pub &'a mut [u8]);

/// A read-only scatter/gather buffer slice.
pub struct IoVec<'a>(pub &'a [u8]);

pub struct Vfs {
    image: Arc<Image>,
    table: Mutex<FdTable>,
}

impl Vfs {
    pub fn new(image: Arc<Image>) -> Self {
        Vfs {
            image,
            table: Mutex::new(FdTable::new()),
        }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    /// True for any virtual fd this table (not the preload cache) owns.
    pub fn owns(&self, fd: i32) -> bool {
        (SABFS_FD_BASE..ELF_CACHE_FD_BASE).contains(&fd) && self.table.lock().unwrap().contains(fd)
    }

    pub fn open(&self, path: &str, flags: i32, mode: u32) -> VfsResult<i32> {
        let image_fd = self.image.open(path, flags, mode)?;
        let is_dir = self
            .image
            .stat(path)
            .map(|s| s.mode & 0o170000 == sabfs_image::FileKind::Directory.type_bits())
            .unwrap_or(false);
        // Directory fds only need a path + enumeration cursor; the image
        // has no separate directory-stream concept, so release its
        // internal handle immediately rather than leak it for the
        // lifetime of the virtual fd.
        let handle = if is_dir {
            self.image.close(image_fd)?;
            Handle::Dir { path: path.to_string(), pos: 0 }
        } else {
            Handle::File { image_fd, path: path.to_string() }
        };
        let mut table = self.table.lock().unwrap();
        table.insert(handle).ok_or_else(|| {
            let _ = self.image.close(image_fd);
            VfsError::Image(SabfsError::NoMemory)
        })
    }

    /// Idempotent: closing an fd this table does not recognize returns
    /// `-EBADF` rather than panicking.
    pub fn close(&self, fd: i32) -> VfsResult<()> {
        let handle = self
            .table
            .lock()
            .unwrap()
            .remove(fd)
            .ok_or(VfsError::BadDescriptor)?;
        if let Handle::File { image_fd, .. } = handle {
            self.image.close(image_fd)?;
        }
        Ok(())
    }

    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let image_fd = self.file_image_fd(fd)?;
        Ok(self.image.pread(image_fd, buf, offset)?)
    }

    pub fn pwrite(&self, fd: i32, buf: &[u8], offset: u64) -> VfsResult<usize> {
        let image_fd = self.file_image_fd(fd)?;
        Ok(self.image.pwrite(image_fd, buf, offset)?)
    }

    /// Implicit-position read/write, tracked by the backing image fd's
    /// own cursor (the image was opened once at `open` time and keeps
    /// its position independent of this table).
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        let image_fd = self.file_image_fd(fd)?;
        Ok(self.image.read(image_fd, buf)?)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> VfsResult<usize> {
        let image_fd = self.file_image_fd(fd)?;
        Ok(self.image.write(image_fd, buf)?)
    }

    /// Linearize into one temporary buffer, issue a single image call,
    /// then scatter back to the caller's vectors. Stops at the first
    /// short read, per POSIX `preadv`.
    pub fn preadv(&self, fd: i32, iovs: &mut [IoVecMut<'_>], offset: u64) -> VfsResult<usize> {
        let total: usize = iovs.iter().map(|v| v.0.len()).sum();
        let mut scratch = vec![0u8; total];
        let n = self.pread(fd, &mut scratch, offset)?;
        let mut remaining = n;
        let mut cursor = 0usize;
        for iov in iovs.iter_mut() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(iov.0.len());
            iov.0[..take].copy_from_slice(&scratch[cursor..cursor + take]);
            cursor += take;
            remaining -= take;
            if take < iov.0.len() {
                break;
            }
        }
        Ok(n)
    }

    pub fn pwritev(&self, fd: i32, iovs: &[IoVec<'_>], offset: u64) -> VfsResult<usize> {
        let mut scratch = Vec::new();
        for iov in iovs {
            scratch.extend_from_slice(iov.0);
        }
        self.pwrite(fd, &scratch, offset)
    }

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        Ok(self.image.stat(path)?)
    }

    /// The image has no fstat primitive; recover the path recorded at
    /// `open` time and stat by path instead.
    pub fn fstat(&self, fd: i32) -> VfsResult<Stat> {
        let table = self.table.lock().unwrap();
        let path = match table.get(fd).ok_or(VfsError::BadDescriptor)? {
            Handle::File { path, .. } => path.clone(),
            Handle::Dir { path, .. } => path.clone(),
        };
        drop(table);
        self.stat(&path)
    }

    pub fn statfs(&self) -> StatFs {
        self.image.statfs()
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        Ok(self.image.mkdir(path, mode)?)
    }
    pub fn rmdir(&self, path: &str) -> VfsResult<()> {
        Ok(self.image.rmdir(path)?)
    }
    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        Ok(self.image.unlink(path)?)
    }
    pub fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        Ok(self.image.rename(old, new)?)
    }
    pub fn symlink(&self, target: &str, link: &str) -> VfsResult<()> {
        Ok(self.image.symlink(target, link)?)
    }
    pub fn readlink(&self, path: &str) -> VfsResult<String> {
        Ok(self.image.readlink(path)?)
    }
    pub fn link(&self, old: &str, new: &str) -> VfsResult<()> {
        Ok(self.image.link(old, new)?)
    }
    pub fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        Ok(self.image.chmod(path, mode)?)
    }
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        Ok(self.image.chown(path, uid, gid)?)
    }
    pub fn truncate(&self, path: &str, length: u64) -> VfsResult<()> {
        Ok(self.image.truncate(path, length)?)
    }
    pub fn utimes(&self, path: &str, atime: i64, mtime: i64) -> VfsResult<()> {
        Ok(self.image.utimes(path, atime, mtime)?)
    }

    pub fn dir_tell(&self, fd: i32) -> VfsResult<usize> {
        let table = self.table.lock().unwrap();
        match table.get(fd).ok_or(VfsError::BadDescriptor)? {
            Handle::Dir { pos, .. } => Ok(*pos),
            Handle::File { .. } => Err(VfsError::NotADirectory),
        }
    }

    pub fn dir_seek(&self, fd: i32, off: usize) -> VfsResult<()> {
        let mut table = self.table.lock().unwrap();
        match table.get_mut(fd).ok_or(VfsError::BadDescriptor)? {
            Handle::Dir { pos, .. } => {
                *pos = off;
                Ok(())
            }
            Handle::File { .. } => Err(VfsError::NotADirectory),
        }
    }

    pub fn dir_rewind(&self, fd: i32) -> VfsResult<()> {
        self.dir_seek(fd, 0)
    }

    /// Re-query the image for the entry at the cursor position and
    /// advance it. Returns `None` at end of directory.
    pub fn dir_next(&self, fd: i32) -> VfsResult<Option<DirEntry>> {
        let path = {
            let table = self.table.lock().unwrap();
            match table.get(fd).ok_or(VfsError::BadDescriptor)? {
                Handle::Dir { path, .. } => path.clone(),
                Handle::File { .. } => return Err(VfsError::NotADirectory),
            }
        };
        let entries = self.image.readdir(&path)?;
        let mut table = self.table.lock().unwrap();
        match table.get_mut(fd).ok_or(VfsError::BadDescriptor)? {
            Handle::Dir { pos, .. } => {
                let entry = entries.get(*pos).cloned();
                if entry.is_some() {
                    *pos += 1;
                }
                Ok(entry)
            }
            Handle::File { .. } => unreachable!(),
        }
    }

    fn file_image_fd(&self, fd: i32) -> VfsResult<i32> {
        let table = self.table.lock().unwrap();
        match table.get(fd).ok_or(VfsError::BadDescriptor)? {
            Handle::File { image_fd, .. } => Ok(*image_fd),
            Handle::Dir { .. } => Err(VfsError::NotADirectory),
        }
    }
}
