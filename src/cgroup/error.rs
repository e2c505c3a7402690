use std::path::PathBuf;
use std::time::Duration;

use crate::fsutil::ReadError;
use crate::range::MalformedRangeError;

use super::CgroupKey;

/// Errors that may occur while resolving a process's cgroup or reading its control files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("process {pid} has no cgroup for controller `{controller}`")]
    NotFound { pid: u32, controller: String },
    #[error("failed to read cgroup membership of process {pid}: {source}")]
    Membership {
        pid: u32,
        #[source]
        source: ReadError,
    },
    #[error("failed to read control `{key}` of cgroup `{cgroup}`: {source}")]
    ControlRead {
        cgroup: CgroupKey,
        key: String,
        #[source]
        source: ReadError,
    },
    #[error("invalid content in control `{key}` of cgroup `{cgroup}`: {source}")]
    ControlParse {
        cgroup: CgroupKey,
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cpu list in cgroup `{cgroup}`: {source}")]
    MalformedRange {
        cgroup: CgroupKey,
        #[source]
        source: MalformedRangeError,
    },
    #[error("cgroup `{cgroup}` has no live tasks")]
    NoTasks { cgroup: CgroupKey },
    #[error("cgroup manager at `{socket}` is unavailable: {reason}")]
    ManagerUnavailable { socket: PathBuf, reason: String },
    #[error("cgroup manager failed to get `{key}` of cgroup `{cgroup}`: {source}")]
    ManagerCall {
        cgroup: CgroupKey,
        key: String,
        #[source]
        source: zbus::Error,
    },
    #[error("cgroup manager did not return `{key}` of cgroup `{cgroup}` within {timeout:?}")]
    ManagerTimeout {
        cgroup: CgroupKey,
        key: String,
        timeout: Duration,
    },
}

impl Error {
    /// Whether the failure comes from a host read or manager call that did
    /// not finish in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Membership { source, .. } | Error::ControlRead { source, .. } => {
                source.is_timeout()
            }
            Error::ManagerTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
