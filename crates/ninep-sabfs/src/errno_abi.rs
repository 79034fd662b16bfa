//! The literal boundary convention the 9p server's operation vector
//! expects: on failure, set the thread-local `errno` and return `-1`,
//! rather than propagating a typed error. Everything above this module
//! stays on `Result`; only the handful of entry points a real 9p
//! transport would call through an FFI vtable go through here.

use crate::adapter::NinepAdapter;
use crate::error::NinepResult;

/// Sets `errno` from `result`'s error (if any) and returns the POSIX
/// `-1`-on-failure convention for operations with no other return value.
fn unit_result_to_c(result: NinepResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_errno(-e.errno());
            -1
        }
    }
}

fn set_errno(e: i32) {
    unsafe {
        *libc::__errno_location() = e;
    }
}

impl NinepAdapter {
    pub fn c_mkdir(&self, path: &str, mode: u32) -> i32 {
        unit_result_to_c(self.mkdir(path, mode))
    }

    pub fn c_rmdir_or_unlink(&self, dir: &str, name: &str, flags: i32) -> i32 {
        unit_result_to_c(self.unlinkat(dir, name, flags))
    }

    pub fn c_chmod(&self, path: &str, mode: u32) -> i32 {
        unit_result_to_c(self.chmod(path, mode))
    }

    pub fn c_fsync(&self, fd: i32) -> i32 {
        unit_result_to_c(self.fsync(fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabfs_image::Image;
    use sabfs_vfs::Vfs;
    use std::sync::Arc;

    #[test]
    fn failure_sets_errno_and_returns_negative_one() {
        let vfs = Arc::new(Vfs::new(Arc::new(Image::new())));
        let adapter = NinepAdapter::new(vfs);
        let rc = adapter.c_chmod("/does/not/exist", 0o644);
        assert_eq!(rc, -1);
        unsafe {
            assert_eq!(*libc::__errno_location(), libc::ENOENT);
        }
    }
}
