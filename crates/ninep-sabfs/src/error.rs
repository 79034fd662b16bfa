//! Errno mapping for the 9p adapter. A superset of [`sabfs_vfs::VfsError`]
//! adding the one outcome the virtual fd layer has no notion of:
//! extended-attribute ops, which this filesystem never supports.

use sabfs_vfs::VfsError;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NinepError {
    #[error("operation not supported")]
    NotSupported,
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl NinepError {
    pub fn errno(self) -> i32 {
        match self {
            NinepError::NotSupported => -libc::ENOTSUP,
            NinepError::Vfs(e) => e.errno(),
        }
    }
}

pub type NinepResult<T> = Result<T, NinepError>;
