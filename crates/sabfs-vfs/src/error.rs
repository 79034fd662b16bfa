//! Errno mapping for the virtual fd layer. A superset of
//! [`sabfs_image::SabfsError`] so the fd table can report its own failures
//! (bad virtual fd, wrong fd kind) without going through the image at all.

use sabfs_image::SabfsError;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("not a directory")]
    NotADirectory,
    #[error(transparent)]
    Image(#[from] SabfsError),
}

impl VfsError {
    pub fn errno(self) -> i32 {
        match self {
            VfsError::BadDescriptor => -libc::EBADF,
            VfsError::NotADirectory => -libc::ENOTDIR,
            VfsError::Image(e) => e.errno(),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
