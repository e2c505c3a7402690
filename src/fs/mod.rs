//! The virtual directory tree and its path-level operations.
//!
//! ```text
//! /                 (inode 1)
//! └── proc          (inode 2)
//!     ├── cpuinfo   (inode 3)
//!     ├── meminfo   (inode 4)
//!     ├── stat      (inode 5)
//!     └── uptime    (inode 6)
//! ```
//!
//! [`VirtualFs`] answers `getattr`, `readdir` and `read` by path; the
//! [`fuse`] module exposes the same tree to the kernel by inode.

mod error;
pub mod fuse;

use std::sync::Arc;

use crate::engine::{CallerContext, Engine};
use crate::proc::ProcFile;

pub use error::{FsError, Result};

/// A node of the virtual tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Root,
    ProcDir,
    File(ProcFile),
}

impl Node {
    pub const ROOT_INODE: u64 = 1;
    const PROC_DIR_INODE: u64 = 2;
    const FIRST_FILE_INODE: u64 = 3;

    pub fn inode(self) -> u64 {
        match self {
            Node::Root => Self::ROOT_INODE,
            Node::ProcDir => Self::PROC_DIR_INODE,
            Node::File(file) => {
                let idx = ProcFile::ALL
                    .iter()
                    .position(|candidate| *candidate == file)
                    .unwrap_or_default();
                Self::FIRST_FILE_INODE + idx as u64
            }
        }
    }

    pub fn from_inode(inode: u64) -> Option<Self> {
        match inode {
            Self::ROOT_INODE => Some(Node::Root),
            Self::PROC_DIR_INODE => Some(Node::ProcDir),
            _ => {
                let idx = usize::try_from(inode.checked_sub(Self::FIRST_FILE_INODE)?).ok()?;
                ProcFile::ALL.get(idx).copied().map(Node::File)
            }
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" => Some(Node::Root),
            "/proc" => Some(Node::ProcDir),
            _ => ProcFile::from_path(path).map(Node::File),
        }
    }

    /// Looks up the entry `name` inside this directory.
    pub fn child(self, name: &str) -> Option<Self> {
        match self {
            Node::Root if name == "proc" => Some(Node::ProcDir),
            Node::ProcDir => ProcFile::from_file_name(name).map(Node::File),
            _ => None,
        }
    }

    pub fn parent(self) -> Self {
        match self {
            Node::Root | Node::ProcDir => Node::Root,
            Node::File(_) => Node::ProcDir,
        }
    }

    pub fn is_dir(self) -> bool {
        !matches!(self, Node::File(_))
    }

    pub fn perm(self) -> u16 {
        if self.is_dir() { 0o755 } else { 0o444 }
    }
}

/// Attributes of a node as seen by one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub node: Node,
    /// Length of the content rendered for the caller; zero for directories.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: &'static str,
    pub node: Node,
}

/// Path-level view of the virtual tree.
#[derive(Debug, Clone)]
pub struct VirtualFs {
    engine: Arc<Engine>,
}

impl VirtualFs {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Returns the attributes of `path`.
    ///
    /// A file's size is the length of its content rendered for `ctx`, so
    /// this renders (or fetches from cache) the file.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `path` is not part of the tree.
    /// - [`FsError::Engine`] if rendering the file fails.
    pub fn getattr(&self, path: &str, ctx: &CallerContext) -> Result<Attr> {
        self.attr(resolve(path)?, ctx)
    }

    pub fn attr(&self, node: Node, ctx: &CallerContext) -> Result<Attr> {
        let size = match node {
            Node::Root | Node::ProcDir => 0,
            Node::File(file) => self.engine.render(file, ctx)?.len() as u64,
        };
        Ok(Attr { node, size })
    }

    /// Lists the directory at `path`, including `.` and `..`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] unless `path` is a directory of the tree.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        resolve(path)
            .ok()
            .and_then(list)
            .ok_or_else(|| FsError::NotFound {
                path: path.to_owned(),
            })
    }

    /// Reads up to `size` bytes of `path` starting at `offset`.
    ///
    /// Reading at or past the end of the content yields no bytes.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] unless `path` is one of the files.
    /// - [`FsError::Engine`] if rendering the file fails.
    pub fn read(
        &self,
        path: &str,
        size: u32,
        offset: u64,
        ctx: &CallerContext,
    ) -> Result<Vec<u8>> {
        match resolve(path)? {
            Node::File(file) => self.read_file(file, size, offset, ctx),
            Node::Root | Node::ProcDir => Err(FsError::NotFound {
                path: path.to_owned(),
            }),
        }
    }

    pub fn read_file(
        &self,
        file: ProcFile,
        size: u32,
        offset: u64,
        ctx: &CallerContext,
    ) -> Result<Vec<u8>> {
        let content = self.engine.render(file, ctx)?;
        let bytes = content.as_bytes();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let end = start.saturating_add(size as usize).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }
}

fn resolve(path: &str) -> Result<Node> {
    Node::from_path(path).ok_or_else(|| FsError::NotFound {
        path: path.to_owned(),
    })
}

/// Entries of a directory node, or `None` for files.
pub fn list(node: Node) -> Option<Vec<DirEntry>> {
    let mut entries = vec![
        DirEntry { name: ".", node },
        DirEntry {
            name: "..",
            node: node.parent(),
        },
    ];
    match node {
        Node::Root => entries.push(DirEntry {
            name: "proc",
            node: Node::ProcDir,
        }),
        Node::ProcDir => entries.extend(ProcFile::ALL.into_iter().map(|file| DirEntry {
            name: file.file_name(),
            node: Node::File(file),
        })),
        Node::File(_) => return None,
    }
    Some(entries)
}
