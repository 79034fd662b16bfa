//! Virtual fd table and POSIX-shaped path API sitting between the shared
//! image (`sabfs-image`) and the syscall dispatcher / 9p adapter. Owns the
//! `SABFS_FD_BASE..ELF_CACHE_FD_BASE` fd range; the preload cache
//! (`elf-cache`) owns the range above it.

mod error;
mod fd;
mod vfs;

pub use error::{VfsError, VfsResult};
pub use fd::{ELF_CACHE_FD_BASE, SABFS_FD_BASE};
pub use vfs::{IoVec, IoVecMut, Vfs};

#[cfg(test)]
mod tests {
    use super::*;
    use sabfs_image::Image;
    use std::sync::Arc;

    fn fixture() -> Vfs {
        let image = Arc::new(Image::new());
        image.import_file("/pack/etc/hello", b"hi\n", 0o644).unwrap();
        Vfs::new(image)
    }

    #[test]
    fn open_returns_a_virtual_fd_in_the_sabfs_range() {
        let vfs = fixture();
        let fd = vfs.open("/pack/etc/hello", libc::O_RDONLY, 0).unwrap();
        assert!((SABFS_FD_BASE..ELF_CACHE_FD_BASE).contains(&fd));
        vfs.close(fd).unwrap();
    }

    #[test]
    fn reopened_fd_reads_back_the_file() {
        let vfs = fixture();
        let fd = vfs.open("/pack/etc/hello", libc::O_RDONLY, 0).unwrap();
        let mut buf = [0u8; 16];
        let n = vfs.pread(fd, &mut buf, 0).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"hi\n");
        vfs.close(fd).unwrap();
    }

    #[test]
    fn close_is_not_idempotent_and_reports_ebadf() {
        let vfs = fixture();
        let fd = vfs.open("/pack/etc/hello", libc::O_RDONLY, 0).unwrap();
        vfs.close(fd).unwrap();
        let err = vfs.close(fd).unwrap_err();
        assert_eq!(err.errno(), -libc::EBADF);
        let err = vfs.pread(fd, &mut [0u8; 4], 0).unwrap_err();
        assert_eq!(err.errno(), -libc::EBADF);
    }

    #[test]
    fn preadv_scatters_and_stops_at_first_short_chunk() {
        let vfs = fixture();
        vfs.image().import_file("/pack/ten", b"0123456789", 0o644).unwrap();
        let fd = vfs.open("/pack/ten", libc::O_RDONLY, 0).unwrap();
        let mut a = [0u8; 6];
        let mut b = [0u8; 6];
        let n = {
            let mut iovs = [IoVecMut(&mut a), IoVecMut(&mut b)];
            vfs.preadv(fd, &mut iovs, 0).unwrap()
        };
        assert_eq!(n, 10);
        assert_eq!(&a, b"012345");
        assert_eq!(&b[..4], b"6789");
        vfs.close(fd).unwrap();
    }

    #[test]
    fn readdir_rewind_then_reenumerate_matches() {
        let vfs = fixture();
        vfs.image().import_file("/pack/dir/a", b"", 0o644).unwrap();
        vfs.image().import_file("/pack/dir/b", b"", 0o644).unwrap();
        let fd = vfs.open("/pack/dir", libc::O_RDONLY | libc::O_DIRECTORY, 0).unwrap();
        let mut first = Vec::new();
        while let Some(e) = vfs.dir_next(fd).unwrap() {
            first.push(e.name);
        }
        vfs.dir_rewind(fd).unwrap();
        let mut second = Vec::new();
        while let Some(e) = vfs.dir_next(fd).unwrap() {
            second.push(e.name);
        }
        assert_eq!(first, second);
        vfs.close(fd).unwrap();
    }

    #[test]
    fn statfs_carries_the_sabfs_magic() {
        let vfs = fixture();
        assert_eq!(vfs.statfs().f_type, 0x5341_4246);
    }
}
