//! In-memory filesystem image shared between the host supervisor and the
//! guest-facing fast path. This crate owns the inode tree and the
//! single-call primitive operations (`stat`, `open`, `pread`, `rename`,
//! ...); it has no notion of virtual file descriptors, syscalls, or guest
//! memory — those live in `sabfs-vfs` and the crates built on top of it.

mod error;
mod fdalloc;
mod image;
mod types;

pub use error::{SabfsError, SabfsResult};
pub use fdalloc::FdAllocator;
pub use image::Image;
pub use types::{DirEntry, FileKind, Stat, StatFs};


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Open,
        Close,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Open), Just(Op::Close)]
    }

    proptest! {
        /// P1: any sequence of opens/closes with no close omitted returns
        /// the open-fd count to its initial value.
        #[test]
        fn open_close_sequences_with_every_open_closed_conserve_fd_count(
            ops in prop::collection::vec(op_strategy(), 0..64)
        ) {
            let img = Image::new();
            img.import_file("/f", b"payload", 0o644).unwrap();
            let mut open_fds = Vec::new();
            for op in ops {
                match op {
                    Op::Open => {
                        if let Ok(fd) = img.open("/f", libc::O_RDONLY, 0) {
                            open_fds.push(fd);
                        }
                    }
                    Op::Close => {
                        if let Some(fd) = open_fds.pop() {
                            img.close(fd).unwrap();
                        }
                    }
                }
            }
            // Drain whatever is left open so every open was eventually closed.
            for fd in open_fds {
                img.close(fd).unwrap();
            }
            prop_assert_eq!(img.open_fd_count(), 0);
        }

        /// P2: `pwrite(fd, buf, n, off)` then `pread(fd, out, n, off)` on
        /// the same image returns `out == buf`.
        #[test]
        fn pwrite_then_pread_at_the_same_offset_roundtrips(
            data in prop::collection::vec(any::<u8>(), 0..256),
            offset in 0u64..512,
        ) {
            let img = Image::new();
            let fd = img.open("/scratch", libc::O_CREAT | libc::O_RDWR, 0o644).unwrap();
            let written = img.pwrite(fd, &data, offset).unwrap();
            prop_assert_eq!(written, data.len());
            let mut out = vec![0u8; data.len()];
            let read = img.pread(fd, &mut out, offset).unwrap();
            prop_assert_eq!(read, data.len());
            prop_assert_eq!(out, data);
            img.close(fd).unwrap();
        }
    }
}
