//! Kernel-facing FUSE adapter over [`VirtualFs`].

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};

use crate::engine::{self, CallerContext};

use super::{Attr, FsError, Node, VirtualFs, list};

/// Attributes depend on the caller, so the kernel must not cache them.
const TTL: Duration = Duration::ZERO;

const BLOCK_SIZE: u32 = 4096;

/// How requests are answered.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// On the FUSE session thread, one request at a time.
    Inline,
    /// On the blocking pool of a tokio runtime.
    Concurrent(tokio::runtime::Handle),
}

/// Serves the virtual tree to the kernel.
#[derive(Debug)]
pub struct FuseAdapter {
    fs: Arc<VirtualFs>,
    dispatch: Dispatch,
    owner: Owner,
}

/// Ownership and timestamps reported for every node.
///
/// Directories never change after mounting. File content is rendered anew
/// for every request, so files report the time of the request.
#[derive(Debug, Clone, Copy)]
struct Owner {
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl Owner {
    fn file_attr(self, attr: &Attr) -> FileAttr {
        let (kind, changed) = if attr.node.is_dir() {
            (FileType::Directory, self.mounted_at)
        } else {
            (FileType::RegularFile, SystemTime::now())
        };
        FileAttr {
            ino: attr.node.inode(),
            size: attr.size,
            blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: changed,
            mtime: changed,
            ctime: changed,
            crtime: self.mounted_at,
            kind,
            perm: attr.node.perm(),
            nlink: if attr.node.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

impl FuseAdapter {
    pub fn new(fs: Arc<VirtualFs>, dispatch: Dispatch) -> Self {
        // SAFETY: getuid and getgid cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            fs,
            dispatch,
            owner: Owner {
                uid,
                gid,
                mounted_at: SystemTime::now(),
            },
        }
    }

    /// Runs `op` for the caller of `req` according to the dispatch mode.
    fn dispatch<F>(&self, req: &Request<'_>, op: F)
    where
        F: FnOnce(&VirtualFs, &CallerContext) + Send + 'static,
    {
        let ctx = CallerContext {
            pid: req.pid(),
            uid: req.uid(),
            gid: req.gid(),
        };
        match &self.dispatch {
            Dispatch::Inline => op(&self.fs, &ctx),
            Dispatch::Concurrent(runtime) => {
                let fs = Arc::clone(&self.fs);
                runtime.spawn_blocking(move || op(&fs, &ctx));
            }
        }
    }
}

/// Logs a failed request and returns its errno.
fn report(op: &str, node: Node, ctx: &CallerContext, err: &FsError) -> i32 {
    match err {
        FsError::Engine(engine::Error::Cache(_)) => {
            log::error!("{op} on inode {} for pid {}: {err}", node.inode(), ctx.pid)
        }
        FsError::NotFound { .. } => {
            log::debug!("{op} on inode {} for pid {}: {err}", node.inode(), ctx.pid)
        }
        FsError::Engine(_) => {
            log::warn!("{op} on inode {} for pid {}: {err}", node.inode(), ctx.pid)
        }
    }
    err.errno()
}

impl Filesystem for FuseAdapter {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let node = Node::from_inode(parent)
            .zip(name.to_str())
            .and_then(|(parent, name)| parent.child(name));
        let Some(node) = node else {
            reply.error(libc::ENOENT);
            return;
        };

        let owner = self.owner;
        self.dispatch(req, move |fs, ctx| match fs.attr(node, ctx) {
            Ok(attr) => reply.entry(&TTL, &owner.file_attr(&attr), 0),
            Err(err) => reply.error(report("lookup", node, ctx, &err)),
        });
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(node) = Node::from_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let owner = self.owner;
        self.dispatch(req, move |fs, ctx| match fs.attr(node, ctx) {
            Ok(attr) => reply.attr(&TTL, &owner.file_attr(&attr)),
            Err(err) => reply.error(report("getattr", node, ctx, &err)),
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match Node::from_inode(ino) {
            Some(Node::File(_)) if flags & libc::O_ACCMODE == libc::O_RDONLY => {
                // Content length differs per caller, so page cache reads would
                // be cut at whatever size the kernel saw first.
                reply.opened(0, fuser::consts::FOPEN_DIRECT_IO);
            }
            Some(Node::File(_)) => reply.error(libc::EACCES),
            Some(_) => reply.error(libc::EISDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(Node::File(file)) = Node::from_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        self.dispatch(req, move |fs, ctx| {
            match fs.read_file(file, size, offset, ctx) {
                Ok(data) => reply.data(&data),
                Err(err) => reply.error(report("read", Node::File(file), ctx, &err)),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(entries) = Node::from_inode(ino).and_then(list) else {
            reply.error(libc::ENOENT);
            return;
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (idx, entry) in entries.iter().enumerate().skip(skip) {
            let kind = if entry.node.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let next = i64::try_from(idx + 1).unwrap_or(i64::MAX);
            if reply.add(entry.node.inode(), next, kind, entry.name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount options for a read-only tree named `cgprocfs`.
pub fn mount_options(allow_other: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName("cgprocfs".to_owned()),
        MountOption::DefaultPermissions,
        MountOption::NoExec,
    ];
    if allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Mounts `adapter` at `mountpoint` and serves requests until unmounted.
///
/// # Errors
///
/// Returns an error if mounting fails or the session ends abnormally.
pub fn mount(adapter: FuseAdapter, mountpoint: &Path, allow_other: bool) -> std::io::Result<()> {
    log::info!("mounting virtual proc files at `{}`", mountpoint.display());
    fuser::mount2(adapter, mountpoint, &mount_options(allow_other))
}
