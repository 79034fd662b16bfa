//! Bounded in-memory cache of whole file images, populated on demand and
//! read from during program-loader traffic. Bypasses SABFS entirely once
//! a file is primed: fd operations here are plain memory copies against
//! the cached bytes.

use std::collections::HashMap;
use std::sync::Mutex;

use sabfs_image::{FdAllocator, Image};
use thiserror::Error;

/// First virtual fd the preload cache hands out. Must stay numerically
/// above `sabfs_vfs::ELF_CACHE_FD_BASE`'s value (they are the same
/// constant by convention; duplicated here so this crate has no
/// dependency on `sabfs-vfs`).
pub const ELF_CACHE_FD_BASE: i32 = 30000;

/// At most this many distinct files may be cached at once.
pub const MAX_FILES: usize = 32;

/// At most this many virtual fds may be open against cached files at
/// once.
pub const MAX_FDS: usize = 256;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    #[error("no such file or directory")]
    NotFound,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error("invalid argument")]
    InvalidArgument,
}

impl CacheError {
    pub fn errno(self) -> i32 {
        let e = match self {
            CacheError::NotFound => libc::ENOENT,
            CacheError::BadDescriptor => libc::EBADF,
            CacheError::NoMemory => libc::ENOMEM,
            CacheError::InvalidArgument => libc::EINVAL,
        };
        -e
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

struct Slot {
    path: String,
    bytes: Vec<u8>,
    mode: u32,
    refcount: u32,
}

struct OpenFd {
    slot: usize,
    pos: u64,
}

pub struct Stat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

struct State {
    slots: Vec<Option<Slot>>,
    fds: HashMap<i32, OpenFd>,
    fd_alloc: FdAllocator,
}

/// The preload cache. Construction takes no image reference: `preload`
/// is handed one explicitly so the cache can also be driven by a plain
/// on-disk fallback path (the 9p export root, when accessed from the
/// host side, has no SABFS image behind it).
pub struct ElfCache {
    state: Mutex<State>,
}

impl Default for ElfCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfCache {
    pub fn new() -> Self {
        ElfCache {
            state: Mutex::new(State {
                slots: (0..MAX_FILES).map(|_| None).collect(),
                fds: HashMap::new(),
                fd_alloc: FdAllocator::new(ELF_CACHE_FD_BASE, ELF_CACHE_FD_BASE + MAX_FDS as i32),
            }),
        }
    }

    /// Install `path`'s full contents into a free slot, reading it from
    /// the shared image first and falling back to an OS-level read of
    /// the same path (the host-mapped export root) if the image does
    /// not have it. A no-op if already cached.
    pub fn preload(&self, image: &Image, path: &str) -> CacheResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.slots.iter().flatten().any(|s| s.path == path) {
            return Ok(());
        }

        let bytes = match image.read_file(path) {
            Ok(b) => b,
            Err(_) => std::fs::read(path).map_err(|_| CacheError::NotFound)?,
        };

        let index = match state.slots.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => state
                .slots
                .iter()
                .position(|s| s.as_ref().map(|s| s.refcount == 0).unwrap_or(false))
                .ok_or(CacheError::NoMemory)?,
        };

        state.slots[index] = Some(Slot {
            path: path.to_string(),
            bytes,
            mode: 0o100755,
            refcount: 0,
        });
        Ok(())
    }

    pub fn open(&self, path: &str) -> CacheResult<i32> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .slots
            .iter()
            .position(|s| s.as_ref().map(|s| s.path == path).unwrap_or(false))
            .ok_or(CacheError::NotFound)?;

        let fds = &state.fds;
        let fd = state
            .fd_alloc
            .alloc(|fd| fds.contains_key(&fd))
            .ok_or(CacheError::NoMemory)?;
        state.fds.insert(fd, OpenFd { slot: index, pos: 0 });
        state.slots[index].as_mut().unwrap().refcount += 1;
        Ok(fd)
    }

    pub fn close(&self, fd: i32) -> CacheResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.fds.remove(&fd).ok_or(CacheError::BadDescriptor)?;
        if let Some(slot) = state.slots[entry.slot].as_mut() {
            slot.refcount = slot.refcount.saturating_sub(1);
        }
        Ok(())
    }

    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: u64) -> CacheResult<usize> {
        let state = self.state.lock().unwrap();
        let entry = state.fds.get(&fd).ok_or(CacheError::BadDescriptor)?;
        let slot = state.slots[entry.slot].as_ref().ok_or(CacheError::BadDescriptor)?;
        Ok(copy_from(&slot.bytes, offset, buf))
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> CacheResult<usize> {
        let offset = {
            let state = self.state.lock().unwrap();
            state.fds.get(&fd).ok_or(CacheError::BadDescriptor)?.pos
        };
        let n = self.pread(fd, buf, offset)?;
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.fds.get_mut(&fd) {
            entry.pos += n as u64;
        }
        Ok(n)
    }

    /// `SEEK_SET/CUR/END`. A resulting negative position is rejected.
    pub fn lseek(&self, fd: i32, offset: i64, whence: Whence) -> CacheResult<u64> {
        let mut state = self.state.lock().unwrap();
        let entry = state.fds.get(&fd).ok_or(CacheError::BadDescriptor)?;
        let size = state.slots[entry.slot]
            .as_ref()
            .ok_or(CacheError::BadDescriptor)?
            .bytes
            .len() as i64;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => entry.pos as i64,
            Whence::End => size,
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return Err(CacheError::InvalidArgument);
        }
        let entry = state.fds.get_mut(&fd).unwrap();
        entry.pos = new_pos as u64;
        Ok(entry.pos)
    }

    pub fn fstat(&self, fd: i32) -> CacheResult<Stat> {
        let state = self.state.lock().unwrap();
        let entry = state.fds.get(&fd).ok_or(CacheError::BadDescriptor)?;
        let slot = state.slots[entry.slot].as_ref().ok_or(CacheError::BadDescriptor)?;
        let size = slot.bytes.len() as u64;
        Ok(Stat {
            ino: 1_000_000 + entry.slot as u64,
            mode: slot.mode,
            nlink: 1,
            size,
            blocks: (size + 511) / 512,
            blksize: 4096,
        })
    }

    pub fn preadv(&self, fd: i32, iovs: &mut [&mut [u8]], offset: u64) -> CacheResult<usize> {
        let total: usize = iovs.iter().map(|v| v.len()).sum();
        let mut scratch = vec![0u8; total];
        let n = self.pread(fd, &mut scratch, offset)?;
        let mut remaining = n;
        let mut cursor = 0usize;
        for iov in iovs.iter_mut() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(iov.len());
            iov[..take].copy_from_slice(&scratch[cursor..cursor + take]);
            cursor += take;
            remaining -= take;
            if take < iov.len() {
                break;
            }
        }
        Ok(n)
    }

    /// Number of fd→slot mappings the preload cache's *own* fd table is
    /// currently tracking. Used by `open`/`close` balance tests.
    pub fn open_fd_count(&self) -> usize {
        self.state.lock().unwrap().fds.len()
    }
}

fn copy_from(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let offset = offset as usize;
    if offset >= data.len() {
        return 0;
    }
    let available = &data[offset..];
    let n = available.len().min(buf.len());
    buf[..n].copy_from_slice(&available[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Image, ElfCache) {
        let image = Image::new();
        image.import_file("/pack/bin/busybox", &[0x7f, b'E', b'L', b'F', 1, 2, 3], 0o755).unwrap();
        (image, ElfCache::new())
    }

    #[test]
    fn preload_then_open_returns_fd_in_the_cache_range() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        let fd = cache.open("/pack/bin/busybox").unwrap();
        assert!(fd >= ELF_CACHE_FD_BASE);
        cache.close(fd).unwrap();
    }

    #[test]
    fn pread_returns_the_elf_magic() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        let fd = cache.open("/pack/bin/busybox").unwrap();
        let mut buf = [0u8; 4];
        let n = cache.pread(fd, &mut buf, 0).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [0x7f, b'E', b'L', b'F']);
        cache.close(fd).unwrap();
    }

    #[test]
    fn preload_is_idempotent_once_cached() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
    }

    #[test]
    fn pinned_slot_survives_cache_pressure() {
        let image = Image::new();
        let cache = ElfCache::new();
        for i in 0..MAX_FILES {
            let path = format!("/pack/f{i}");
            image.import_file(&path, b"x", 0o644).unwrap();
            cache.preload(&image, &path).unwrap();
        }
        let pinned_fd = cache.open("/pack/f0").unwrap();

        image.import_file("/pack/new", b"y", 0o644).unwrap();
        cache.preload(&image, "/pack/new").unwrap();

        // f0 must still be resolvable: its slot was pinned by the open fd.
        let mut buf = [0u8; 1];
        cache.pread(pinned_fd, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"x");
        cache.close(pinned_fd).unwrap();
    }

    #[test]
    fn close_balances_fd_count() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        assert_eq!(cache.open_fd_count(), 0);
        let fd = cache.open("/pack/bin/busybox").unwrap();
        assert_eq!(cache.open_fd_count(), 1);
        cache.close(fd).unwrap();
        assert_eq!(cache.open_fd_count(), 0);
    }

    #[test]
    fn lseek_end_then_read_returns_eof() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        let fd = cache.open("/pack/bin/busybox").unwrap();
        cache.lseek(fd, 0, Whence::End).unwrap();
        let mut buf = [0u8; 4];
        let n = cache.read(fd, &mut buf).unwrap();
        assert_eq!(n, 0);
        cache.close(fd).unwrap();
    }

    #[test]
    fn lseek_to_negative_position_is_rejected() {
        let (image, cache) = fixture();
        cache.preload(&image, "/pack/bin/busybox").unwrap();
        let fd = cache.open("/pack/bin/busybox").unwrap();
        assert_eq!(cache.lseek(fd, -1, Whence::Set), Err(CacheError::InvalidArgument));
        cache.close(fd).unwrap();
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// P4: `pread` after `preload(path)` + `open(path)` returns the same
    /// bytes as the image's contents at `[off, off+n)`, for arbitrary
    /// file contents and read windows.
    proptest! {
        #[test]
        fn pread_after_preload_matches_the_image_contents(
            data in prop::collection::vec(any::<u8>(), 0..256),
            offset in 0u64..256,
            len in 0usize..256,
        ) {
            let image = Image::new();
            image.import_file("/pack/fixture", &data, 0o644).unwrap();
            let cache = ElfCache::new();
            cache.preload(&image, "/pack/fixture").unwrap();
            let fd = cache.open("/pack/fixture").unwrap();

            let mut buf = vec![0u8; len];
            let n = cache.pread(fd, &mut buf, offset).unwrap();

            let start = (offset as usize).min(data.len());
            let expected = &data[start..];
            let expected_len = expected.len().min(len);
            prop_assert_eq!(n, expected_len);
            prop_assert_eq!(&buf[..n], &expected[..n]);

            cache.close(fd).unwrap();
            prop_assert_eq!(cache.open_fd_count(), 0);
        }
    }
}
