//! Inode representation and the value types primitives return.

use std::collections::BTreeMap;

/// Kind of filesystem object an inode represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

impl FileKind {
    pub fn type_bits(self) -> u32 {
        match self {
            FileKind::Regular => 0o100000,
            FileKind::Directory => 0o040000,
            FileKind::Symlink => 0o120000,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Content {
    Regular(Vec<u8>),
    Directory(BTreeMap<String, u64>),
    Symlink(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Inode {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub content: Content,
}

impl Inode {
    pub fn kind(&self) -> FileKind {
        match &self.content {
            Content::Regular(_) => FileKind::Regular,
            Content::Directory(_) => FileKind::Directory,
            Content::Symlink(_) => FileKind::Symlink,
        }
    }

    pub fn size(&self) -> u64 {
        match &self.content {
            Content::Regular(data) => data.len() as u64,
            Content::Directory(children) => children.len() as u64,
            Content::Symlink(target) => target.len() as u64,
        }
    }

    pub fn blocks(&self) -> u64 {
        (self.size() + 511) / 512
    }
}

/// Directory entry as returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: FileKind,
}

/// Result of `stat`/`lstat`/`fstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
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

/// Result of `statfs`. `f_type` is the "SABF" magic from the source
/// protocol; the rest are fixed defaults since the image does not track
/// real block-level usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub f_type: u32,
    pub bsize: u32,
    pub blocks: u64,
    pub bfree: u64,
    pub files: u64,
    pub ffree: u64,
    pub namelen: u32,
}

impl Default for StatFs {
    fn default() -> Self {
        Self {
            f_type: 0x5341_4246, // "SABF"
            bsize: 4096,
            blocks: 1_048_576,
            bfree: 524_288,
            files: 65536,
            ffree: 32768,
            namelen: 255,
        }
    }
}
