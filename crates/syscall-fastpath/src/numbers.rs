//! Linux x86-64 syscall numbers the classifier cares about. Every other
//! number is always "not handled".

pub const READ: i64 = 0;
pub const WRITE: i64 = 1;
pub const OPEN: i64 = 2;
pub const CLOSE: i64 = 3;
pub const STAT: i64 = 4;
pub const FSTAT: i64 = 5;
pub const CLONE: i64 = 56;
pub const FORK: i64 = 57;
pub const VFORK: i64 = 58;
pub const EXECVE: i64 = 59;
pub const EXIT: i64 = 60;
pub const WAIT4: i64 = 61;
pub const EXIT_GROUP: i64 = 231;
pub const OPENAT: i64 = 257;

/// `openat`'s dirfd meaning "resolve relative to the calling process's
/// current working directory" — the only dirfd value this fast path
/// intercepts.
pub const AT_FDCWD: i64 = -100;

/// `read`/`write` clamp their requested length to this many bytes,
/// bounding the temporary host allocation.
pub const MAX_IO_LEN: u64 = 65536;
