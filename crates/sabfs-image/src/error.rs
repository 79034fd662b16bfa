//! Error type for shared-image primitives.
//!
//! Every primitive in this crate returns a typed [`SabfsError`]; callers at
//! the syscall boundary convert it to the negative errno Linux expects via
//! [`SabfsError::errno`].

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SabfsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("file exists")]
    Exists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error("operation not supported")]
    NotSupported,
    #[error("name too long")]
    NameTooLong,
    #[error("too many levels of symbolic links")]
    TooManyLinks,
}

impl SabfsError {
    /// Negative errno a C-style wrapper should hand back to its caller.
    pub fn errno(self) -> i32 {
        let e = match self {
            SabfsError::NotFound => libc::ENOENT,
            SabfsError::NotADirectory => libc::ENOTDIR,
            SabfsError::IsADirectory => libc::EISDIR,
            SabfsError::Exists => libc::EEXIST,
            SabfsError::NotEmpty => libc::ENOTEMPTY,
            SabfsError::BadDescriptor => libc::EBADF,
            SabfsError::InvalidArgument => libc::EINVAL,
            SabfsError::NoMemory => libc::ENOMEM,
            SabfsError::NotSupported => libc::ENOTSUP,
            SabfsError::NameTooLong => libc::ENAMETOOLONG,
            SabfsError::TooManyLinks => libc::ELOOP,
        };
        -e
    }
}

pub type SabfsResult<T> = Result<T, SabfsError>;
