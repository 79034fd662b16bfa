//! Virtual fd table: the process-wide mapping from a virtual fd handed to
//! the guest to the backing image fd (or, for directory fds, to a
//! `{path, pos}` cursor). Virtual fds are drawn from
//! `[SABFS_FD_BASE, ELF_CACHE_FD_BASE)`; the preload cache owns the range
//! above that (see `elf-cache`).

use sabfs_image::FdAllocator;

/// First virtual fd handed out for a directly-opened SABFS file or
/// directory.
pub const SABFS_FD_BASE: i32 = 10000;

/// First virtual fd handed out by the preload cache. SABFS never
/// allocates into or above this value.
pub const ELF_CACHE_FD_BASE: i32 = 30000;

pub(crate) enum Handle {
    File { image_fd: i32, path: String },
    Dir { path: String, pos: usize },
}

pub(crate) struct FdTable {
    handles: std::collections::HashMap<i32, Handle>,
    alloc: FdAllocator,
}

impl FdTable {
    pub fn new() -> Self {
        FdTable {
            handles: std::collections::HashMap::new(),
            alloc: FdAllocator::new(SABFS_FD_BASE, ELF_CACHE_FD_BASE),
        }
    }

    pub fn insert(&mut self, handle: Handle) -> Option<i32> {
        let handles = &self.handles;
        let fd = self.alloc.alloc(|fd| handles.contains_key(&fd))?;
        self.handles.insert(fd, handle);
        Some(fd)
    }

    pub fn get(&self, fd: i32) -> Option<&Handle> {
        self.handles.get(&fd)
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut Handle> {
        self.handles.get_mut(&fd)
    }

    pub fn remove(&mut self, fd: i32) -> Option<Handle> {
        self.handles.remove(&fd)
    }

    pub fn contains(&self, fd: i32) -> bool {
        self.handles.contains_key(&fd)
    }
}
