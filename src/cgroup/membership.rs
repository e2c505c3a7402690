use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fsutil::HostFs;

use super::{Error, Result};

/// A cgroup path scoped to the controller it was resolved for.
///
/// Two controllers may report different paths for the same container, so the
/// controller is part of the key.
///
/// # Examples
///
/// ```
/// # use cgprocfs::cgroup::CgroupKey;
/// let key = CgroupKey::new("cpuset", "/lxc/c1");
/// assert_eq!(key.to_string(), "cpuset:/lxc/c1");
/// assert_eq!(key.relative_path(), std::path::Path::new("lxc/c1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CgroupKey {
    controller: Arc<str>,
    path: Arc<str>,
}

impl CgroupKey {
    pub fn new(controller: impl AsRef<str>, path: impl AsRef<str>) -> Self {
        Self {
            controller: controller.as_ref().into(),
            path: path.as_ref().into(),
        }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// The cgroup path as listed in `/proc/<pid>/cgroup`, e.g. `/lxc/c1`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The cgroup path relative to its controller's mount point.
    pub fn relative_path(&self) -> &Path {
        Path::new(self.path.trim_start_matches('/'))
    }

    /// The directory of this cgroup below `mount`.
    pub fn dir(&self, mount: &Path) -> PathBuf {
        mount.join(self.relative_path())
    }
}

impl fmt::Display for CgroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.controller, self.path)
    }
}

/// Finds the cgroup path for `controller` in `/proc/<pid>/cgroup` content.
///
/// Each line has the form `<hierarchy-id>:<controller-list>:<cgroup-path>`,
/// where the controller list is comma-separated for co-mounted controllers
/// (e.g. `cpu,cpuacct`). Lines that do not have three fields are skipped.
pub fn parse_membership<'a>(content: &'a str, controller: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let mut fields = line.splitn(3, ':');
        let _hierarchy = fields.next()?;
        let controllers = fields.next()?;
        let path = fields.next()?;
        controllers
            .split(',')
            .any(|name| name == controller)
            .then_some(path.trim())
    })
}

/// Resolves the cgroup of process `pid` for `controller`.
///
/// # Errors
///
/// - [`Error::NotFound`] if the process has exited or is not attached to `controller`.
/// - [`Error::Membership`] if `/proc/<pid>/cgroup` exists but cannot be read.
pub fn cgroup_path(host: &HostFs, pid: u32, controller: &str) -> Result<CgroupKey> {
    let not_found = || Error::NotFound {
        pid,
        controller: controller.to_owned(),
    };

    let content = match host.read_to_string(format!("/proc/{pid}/cgroup")) {
        Ok(content) => content,
        Err(err) if err.is_not_found() => return Err(not_found()),
        Err(source) => return Err(Error::Membership { pid, source }),
    };

    parse_membership(&content, controller)
        .map(|path| CgroupKey::new(controller, path))
        .ok_or_else(not_found)
}
