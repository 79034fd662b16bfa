//! Marshals stat-like results into the byte layout glibc's x86-64
//! `struct stat` uses, field by field, so the guest reading it back
//! through its own libc sees ordinary values.

use guest_mem::{write_guest_buffer, GuestMemory};

/// Fields common to `sabfs_image::Stat` and `elf_cache::Stat`; the
/// dispatcher converts either into this before marshaling so a single
/// `write_stat` serves both `stat`/`openat` and cache-backed `fstat`.
pub struct FlatStat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blocks: u64,
    pub blksize: u32,
}

impl From<sabfs_image::Stat> for FlatStat {
    fn from(s: sabfs_image::Stat) -> Self {
        FlatStat {
            ino: s.ino,
            mode: s.mode,
            nlink: s.nlink,
            uid: s.uid,
            gid: s.gid,
            size: s.size,
            atime: s.atime,
            mtime: s.mtime,
            ctime: s.ctime,
            blocks: s.blocks,
            blksize: s.blksize,
        }
    }
}

impl From<elf_cache::Stat> for FlatStat {
    fn from(s: elf_cache::Stat) -> Self {
        FlatStat {
            ino: s.ino,
            mode: s.mode,
            nlink: s.nlink,
            uid: 0,
            gid: 0,
            size: s.size,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blocks: s.blocks,
            blksize: s.blksize,
        }
    }
}

const ST_DEV: usize = 0;
const ST_INO: usize = 8;
const ST_NLINK: usize = 16;
const ST_MODE: usize = 24;
const ST_UID: usize = 28;
const ST_GID: usize = 32;
const ST_RDEV: usize = 40;
const ST_SIZE: usize = 48;
const ST_BLKSIZE: usize = 56;
const ST_BLOCKS: usize = 64;
const ST_ATIME: usize = 72;
const ST_MTIME: usize = 88;
const ST_CTIME: usize = 104;

/// Total size of the glibc x86-64 `struct stat`.
pub const STAT_BUF_LEN: usize = 144;

pub fn write_stat(mem: &mut impl GuestMemory, va: u64, stat: &FlatStat) -> Result<(), guest_mem::GuestMemError> {
    let mut buf = [0u8; STAT_BUF_LEN];
    put_u64(&mut buf, ST_DEV, 0);
    put_u64(&mut buf, ST_INO, stat.ino);
    put_u64(&mut buf, ST_NLINK, stat.nlink as u64);
    put_u32(&mut buf, ST_MODE, stat.mode);
    put_u32(&mut buf, ST_UID, stat.uid);
    put_u32(&mut buf, ST_GID, stat.gid);
    put_u64(&mut buf, ST_RDEV, 0);
    put_u64(&mut buf, ST_SIZE, stat.size);
    put_u64(&mut buf, ST_BLKSIZE, stat.blksize as u64);
    put_u64(&mut buf, ST_BLOCKS, stat.blocks);
    put_u64(&mut buf, ST_ATIME, stat.atime as u64);
    put_u64(&mut buf, ST_MTIME, stat.mtime as u64);
    put_u64(&mut buf, ST_CTIME, stat.ctime as u64);
    write_guest_buffer(mem, va, &buf)
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use guest_mem::MockGuestMemory;

    #[test]
    fn writes_size_and_mode_at_the_expected_offsets() {
        let mut mem = MockGuestMemory::new(256);
        let stat = FlatStat {
            ino: 42,
            mode: 0o100644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 3,
            atime: 1000,
            mtime: 1000,
            ctime: 1000,
            blocks: 1,
            blksize: 4096,
        };
        write_stat(&mut mem, 0, &stat).unwrap();
        let size_bytes = mem.read_at(ST_SIZE as u64, 8);
        assert_eq!(u64::from_ne_bytes(size_bytes.try_into().unwrap()), 3);
        let mode_bytes = mem.read_at(ST_MODE as u64, 4);
        assert_eq!(u32::from_ne_bytes(mode_bytes.try_into().unwrap()), 0o100644);
    }
}
