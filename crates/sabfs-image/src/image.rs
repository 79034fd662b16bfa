//! The shared filesystem image: a directory tree held in memory and
//! accessed through single-call primitive operations. Every method takes
//! `&self` — internal mutability is a single [`std::sync::RwLock`], matching
//! the invariant that SABFS offers per-call consistency with no cross-fd
//! transaction (see the concurrency notes in the top-level design).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{SabfsError, SabfsResult};
use crate::fdalloc::FdAllocator;
use crate::types::{Content, DirEntry, FileKind, Inode, Stat, StatFs};

const ROOT_INO: u64 = 1;
const MAX_SYMLINK_HOPS: u32 = 8;
const IMAGE_FD_BASE: i32 = 3;
const IMAGE_FD_LIMIT: i32 = 1 << 30;

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct OpenFile {
    ino: u64,
    flags: i32,
    pos: u64,
}

struct State {
    inodes: HashMap<u64, Inode>,
    next_ino: u64,
    open: HashMap<i32, OpenFile>,
    fds: FdAllocator,
}

impl State {
    fn alloc_ino(&mut self) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    fn alloc_fd(&mut self) -> SabfsResult<i32> {
        let open = &self.open;
        self.fds
            .alloc(|fd| open.contains_key(&fd))
            .ok_or(SabfsError::NoMemory)
    }

    fn dir_children_mut(&mut self, ino: u64) -> SabfsResult<&mut BTreeMap<String, u64>> {
        match &mut self.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?.content {
            Content::Directory(children) => Ok(children),
            _ => Err(SabfsError::NotADirectory),
        }
    }

    /// Resolve a path to an inode number, following symlinks in
    /// intermediate components always and in the final component only when
    /// `follow_final` is set.
    fn resolve(&self, path: &str, follow_final: bool) -> SabfsResult<u64> {
        let mut components: VecDeque<String> = split_absolute(path)?.into();
        let mut cur = ROOT_INO;
        let mut hops = 0u32;

        while let Some(name) = components.pop_front() {
            let dir = self.inodes.get(&cur).ok_or(SabfsError::NotFound)?;
            let children = match &dir.content {
                Content::Directory(c) => c,
                _ => return Err(SabfsError::NotADirectory),
            };
            let child_ino = *children.get(&name).ok_or(SabfsError::NotFound)?;
            let is_final = components.is_empty();
            let child = self.inodes.get(&child_ino).ok_or(SabfsError::NotFound)?;

            if child.kind() == FileKind::Symlink && (!is_final || follow_final) {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(SabfsError::TooManyLinks);
                }
                let target = match &child.content {
                    Content::Symlink(t) => t.clone(),
                    _ => unreachable!(),
                };
                if target.starts_with('/') {
                    cur = ROOT_INO;
                    for c in split_absolute(&target)?.into_iter().rev() {
                        components.push_front(c);
                    }
                } else {
                    for c in split_relative_checked(&target)?.into_iter().rev() {
                        components.push_front(c);
                    }
                }
                continue;
            }

            cur = child_ino;
        }
        Ok(cur)
    }

    fn resolve_parent(&self, path: &str) -> SabfsResult<(u64, String)> {
        let mut parts = split_absolute(path)?;
        let name = parts.pop().ok_or(SabfsError::InvalidArgument)?;
        let parent_path = if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        };
        let parent_ino = self.resolve(&parent_path, true)?;
        Ok((parent_ino, name))
    }

    fn build_stat(&self, ino: u64) -> SabfsResult<Stat> {
        let inode = self.inodes.get(&ino).ok_or(SabfsError::NotFound)?;
        Ok(Stat {
            ino: inode.ino,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size(),
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
            blocks: inode.blocks(),
            blksize: 4096,
        })
    }
}

const NAME_MAX: usize = 255;

fn split_absolute(path: &str) -> SabfsResult<Vec<String>> {
    if !path.starts_with('/') {
        return Err(SabfsError::InvalidArgument);
    }
    split_relative_checked(path)
}

fn split_relative_checked(path: &str) -> SabfsResult<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            s => {
                if s.len() > NAME_MAX {
                    return Err(SabfsError::NameTooLong);
                }
                out.push(s.to_string())
            }
        }
    }
    Ok(out)
}

/// The shared filesystem image.
pub struct Image {
    state: RwLock<State>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    pub fn new() -> Self {
        let mut inodes = HashMap::new();
        let ts = now();
        inodes.insert(
            ROOT_INO,
            Inode {
                ino: ROOT_INO,
                mode: FileKind::Directory.type_bits() | 0o755,
                nlink: 2,
                uid: 0,
                gid: 0,
                atime: ts,
                mtime: ts,
                ctime: ts,
                content: Content::Directory(BTreeMap::new()),
            },
        );
        Image {
            state: RwLock::new(State {
                inodes,
                next_ino: ROOT_INO + 1,
                open: HashMap::new(),
                fds: FdAllocator::new(IMAGE_FD_BASE, IMAGE_FD_LIMIT),
            }),
        }
    }

    /// Import a whole file into the image, creating any missing parent
    /// directories. Used by test fixtures and the image-packing tool's
    /// in-process equivalent; not part of the guest-facing surface.
    pub fn import_file(&self, path: &str, data: &[u8], mode: u32) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let parts = split_absolute(path)?;
        if parts.is_empty() {
            return Err(SabfsError::InvalidArgument);
        }
        let mut parent = ROOT_INO;
        for dir_name in &parts[..parts.len() - 1] {
            parent = match state.dir_children_mut(parent)?.get(dir_name).copied() {
                Some(ino) => ino,
                None => {
                    let ino = state.alloc_ino();
                    let ts = now();
                    state.inodes.insert(
                        ino,
                        Inode {
                            ino,
                            mode: FileKind::Directory.type_bits() | 0o755,
                            nlink: 2,
                            uid: 0,
                            gid: 0,
                            atime: ts,
                            mtime: ts,
                            ctime: ts,
                            content: Content::Directory(BTreeMap::new()),
                        },
                    );
                    state
                        .dir_children_mut(parent)?
                        .insert(dir_name.clone(), ino);
                    ino
                }
            };
        }
        let name = parts.last().unwrap().clone();
        let ino = state.alloc_ino();
        let ts = now();
        state.inodes.insert(
            ino,
            Inode {
                ino,
                mode: FileKind::Regular.type_bits() | (mode & 0o7777),
                nlink: 1,
                uid: 0,
                gid: 0,
                atime: ts,
                mtime: ts,
                ctime: ts,
                content: Content::Regular(data.to_vec()),
            },
        );
        state.dir_children_mut(parent)?.insert(name, ino);
        Ok(())
    }

    pub fn stat(&self, path: &str) -> SabfsResult<Stat> {
        let state = self.state.read().unwrap();
        let ino = state.resolve(path, true)?;
        state.build_stat(ino)
    }

    pub fn lstat(&self, path: &str) -> SabfsResult<Stat> {
        let state = self.state.read().unwrap();
        let ino = state.resolve(path, false)?;
        state.build_stat(ino)
    }

    pub fn open(&self, path: &str, flags: i32, mode: u32) -> SabfsResult<i32> {
        let mut state = self.state.write().unwrap();
        let follow = flags & libc::O_NOFOLLOW == 0;

        let ino = match state.resolve(path, follow) {
            Ok(ino) => {
                if flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0 {
                    return Err(SabfsError::Exists);
                }
                ino
            }
            Err(SabfsError::NotFound) if flags & libc::O_CREAT != 0 => {
                let (parent, name) = state.resolve_parent(path)?;
                let ino = state.alloc_ino();
                let ts = now();
                state.inodes.insert(
                    ino,
                    Inode {
                        ino,
                        mode: FileKind::Regular.type_bits() | (mode & 0o7777),
                        nlink: 1,
                        uid: 0,
                        gid: 0,
                        atime: ts,
                        mtime: ts,
                        ctime: ts,
                        content: Content::Regular(Vec::new()),
                    },
                );
                state.dir_children_mut(parent)?.insert(name, ino);
                ino
            }
            Err(e) => return Err(e),
        };

        let size = {
            let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?;
            if inode.kind() == FileKind::Directory
                && (flags & libc::O_ACCMODE) != libc::O_RDONLY
            {
                return Err(SabfsError::IsADirectory);
            }
            if flags & libc::O_TRUNC != 0 {
                if let Content::Regular(data) = &mut inode.content {
                    data.clear();
                    inode.mtime = now();
                }
            }
            inode.size()
        };

        let fd = state.alloc_fd()?;
        let pos = if flags & libc::O_APPEND != 0 { size } else { 0 };
        state.open.insert(fd, OpenFile { ino, flags, pos });
        Ok(fd)
    }

    pub fn close(&self, fd: i32) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        state.open.remove(&fd).ok_or(SabfsError::BadDescriptor)?;
        Ok(())
    }

    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: u64) -> SabfsResult<usize> {
        let state = self.state.read().unwrap();
        let open = state.open.get(&fd).ok_or(SabfsError::BadDescriptor)?;
        let inode = state.inodes.get(&open.ino).ok_or(SabfsError::BadDescriptor)?;
        let data = match &inode.content {
            Content::Regular(d) => d,
            Content::Directory(_) => return Err(SabfsError::IsADirectory),
            Content::Symlink(_) => return Err(SabfsError::InvalidArgument),
        };
        Ok(copy_from(data, offset, buf))
    }

    pub fn pwrite(&self, fd: i32, buf: &[u8], offset: u64) -> SabfsResult<usize> {
        let mut state = self.state.write().unwrap();
        let ino = state.open.get(&fd).ok_or(SabfsError::BadDescriptor)?.ino;
        let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::BadDescriptor)?;
        let data = match &mut inode.content {
            Content::Regular(d) => d,
            Content::Directory(_) => return Err(SabfsError::IsADirectory),
            Content::Symlink(_) => return Err(SabfsError::InvalidArgument),
        };
        let n = copy_into(data, offset, buf);
        inode.mtime = now();
        Ok(n)
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> SabfsResult<usize> {
        let offset = {
            let state = self.state.read().unwrap();
            state.open.get(&fd).ok_or(SabfsError::BadDescriptor)?.pos
        };
        let n = self.pread(fd, buf, offset)?;
        let mut state = self.state.write().unwrap();
        if let Some(open) = state.open.get_mut(&fd) {
            open.pos += n as u64;
        }
        Ok(n)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> SabfsResult<usize> {
        let offset = {
            let state = self.state.read().unwrap();
            let open = state.open.get(&fd).ok_or(SabfsError::BadDescriptor)?;
            if open.flags & libc::O_APPEND != 0 {
                state.inodes.get(&open.ino).map(|i| i.size()).unwrap_or(0)
            } else {
                open.pos
            }
        };
        let n = self.pwrite(fd, buf, offset)?;
        let mut state = self.state.write().unwrap();
        if let Some(open) = state.open.get_mut(&fd) {
            open.pos = offset + n as u64;
        }
        Ok(n)
    }

    /// Read an entire regular file in one call (`readFile` in the source
    /// protocol), bypassing fd bookkeeping entirely.
    pub fn read_file(&self, path: &str) -> SabfsResult<Vec<u8>> {
        let state = self.state.read().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get(&ino).ok_or(SabfsError::NotFound)?;
        match &inode.content {
            Content::Regular(data) => Ok(data.clone()),
            Content::Directory(_) => Err(SabfsError::IsADirectory),
            Content::Symlink(_) => Err(SabfsError::InvalidArgument),
        }
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let (parent, name) = state.resolve_parent(path)?;
        if state.dir_children_mut(parent)?.contains_key(&name) {
            return Err(SabfsError::Exists);
        }
        let ino = state.alloc_ino();
        let ts = now();
        state.inodes.insert(
            ino,
            Inode {
                ino,
                mode: FileKind::Directory.type_bits() | (mode & 0o7777),
                nlink: 2,
                uid: 0,
                gid: 0,
                atime: ts,
                mtime: ts,
                ctime: ts,
                content: Content::Directory(BTreeMap::new()),
            },
        );
        state.dir_children_mut(parent)?.insert(name, ino);
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let (parent, name) = state.resolve_parent(path)?;
        let child_ino = *state
            .dir_children_mut(parent)?
            .get(&name)
            .ok_or(SabfsError::NotFound)?;
        let is_empty = match &state.inodes.get(&child_ino).ok_or(SabfsError::NotFound)?.content {
            Content::Directory(children) => children.is_empty(),
            _ => return Err(SabfsError::NotADirectory),
        };
        if !is_empty {
            return Err(SabfsError::NotEmpty);
        }
        state.dir_children_mut(parent)?.remove(&name);
        state.inodes.remove(&child_ino);
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let (parent, name) = state.resolve_parent(path)?;
        let child_ino = *state
            .dir_children_mut(parent)?
            .get(&name)
            .ok_or(SabfsError::NotFound)?;
        if state.inodes.get(&child_ino).ok_or(SabfsError::NotFound)?.kind()
            == FileKind::Directory
        {
            return Err(SabfsError::IsADirectory);
        }
        state.dir_children_mut(parent)?.remove(&name);
        let gone = {
            let inode = state.inodes.get_mut(&child_ino).unwrap();
            inode.nlink = inode.nlink.saturating_sub(1);
            inode.nlink == 0
        };
        if gone {
            state.inodes.remove(&child_ino);
        }
        Ok(())
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let (old_parent, old_name) = state.resolve_parent(old_path)?;
        let child_ino = *state
            .dir_children_mut(old_parent)?
            .get(&old_name)
            .ok_or(SabfsError::NotFound)?;
        let (new_parent, new_name) = state.resolve_parent(new_path)?;
        if let Some(existing) = state.dir_children_mut(new_parent)?.get(&new_name).copied() {
            if existing != child_ino {
                state.dir_children_mut(new_parent)?.remove(&new_name);
                state.inodes.remove(&existing);
            }
        }
        state.dir_children_mut(old_parent)?.remove(&old_name);
        state.dir_children_mut(new_parent)?.insert(new_name, child_ino);
        Ok(())
    }

    pub fn symlink(&self, target: &str, link_path: &str) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let (parent, name) = state.resolve_parent(link_path)?;
        if state.dir_children_mut(parent)?.contains_key(&name) {
            return Err(SabfsError::Exists);
        }
        let ino = state.alloc_ino();
        let ts = now();
        state.inodes.insert(
            ino,
            Inode {
                ino,
                mode: FileKind::Symlink.type_bits() | 0o777,
                nlink: 1,
                uid: 0,
                gid: 0,
                atime: ts,
                mtime: ts,
                ctime: ts,
                content: Content::Symlink(target.to_string()),
            },
        );
        state.dir_children_mut(parent)?.insert(name, ino);
        Ok(())
    }

    pub fn readlink(&self, path: &str) -> SabfsResult<String> {
        let state = self.state.read().unwrap();
        let ino = state.resolve(path, false)?;
        match &state.inodes.get(&ino).ok_or(SabfsError::NotFound)?.content {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(SabfsError::InvalidArgument),
        }
    }

    pub fn link(&self, old_path: &str, new_path: &str) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let ino = state.resolve(old_path, false)?;
        if state.inodes.get(&ino).ok_or(SabfsError::NotFound)?.kind() == FileKind::Directory {
            return Err(SabfsError::IsADirectory);
        }
        let (parent, name) = state.resolve_parent(new_path)?;
        if state.dir_children_mut(parent)?.contains_key(&name) {
            return Err(SabfsError::Exists);
        }
        state.dir_children_mut(parent)?.insert(name, ino);
        state.inodes.get_mut(&ino).unwrap().nlink += 1;
        Ok(())
    }

    pub fn chmod(&self, path: &str, mode: u32) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?;
        inode.mode = inode.kind().type_bits() | (mode & 0o7777);
        inode.ctime = now();
        Ok(())
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?;
        inode.uid = uid;
        inode.gid = gid;
        inode.ctime = now();
        Ok(())
    }

    pub fn truncate(&self, path: &str, length: u64) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?;
        match &mut inode.content {
            Content::Regular(data) => {
                data.resize(length as usize, 0);
                inode.mtime = now();
                Ok(())
            }
            Content::Directory(_) => Err(SabfsError::IsADirectory),
            Content::Symlink(_) => Err(SabfsError::InvalidArgument),
        }
    }

    pub fn utimes(&self, path: &str, atime: i64, mtime: i64) -> SabfsResult<()> {
        let mut state = self.state.write().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get_mut(&ino).ok_or(SabfsError::NotFound)?;
        inode.atime = atime;
        inode.mtime = mtime;
        Ok(())
    }

    pub fn readdir(&self, path: &str) -> SabfsResult<Vec<DirEntry>> {
        let state = self.state.read().unwrap();
        let ino = state.resolve(path, true)?;
        let inode = state.inodes.get(&ino).ok_or(SabfsError::NotFound)?;
        match &inode.content {
            Content::Directory(children) => Ok(children
                .iter()
                .map(|(name, ino)| DirEntry {
                    name: name.clone(),
                    ino: *ino,
                    kind: state.inodes[ino].kind(),
                })
                .collect()),
            _ => Err(SabfsError::NotADirectory),
        }
    }

    pub fn statfs(&self) -> StatFs {
        let state = self.state.read().unwrap();
        let files = state.inodes.len() as u64;
        StatFs {
            files,
            ffree: 65536u64.saturating_sub(files),
            ..StatFs::default()
        }
    }

    /// Number of currently open image fds, for the `open`/`close` balance
    /// property (every open is paired with exactly one close).
    pub fn open_fd_count(&self) -> usize {
        self.state.read().unwrap().open.len()
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

fn copy_into(data: &mut Vec<u8>, offset: u64, buf: &[u8]) -> usize {
    let offset = offset as usize;
    if data.len() < offset + buf.len() {
        data.resize(offset + buf.len(), 0);
    }
    data[offset..offset + buf.len()].copy_from_slice(buf);
    buf.len()
}
