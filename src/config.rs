//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::cgroup::CGMANAGER_SOCKET;

/// Where cgroup control values are read from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSourceKind {
    /// Control files below the mounted v1 hierarchies
    Files,
    /// The cgmanager daemon, over its D-Bus socket
    Cgmanager,
}

/// Per-container views of `/proc/cpuinfo`, `meminfo`, `stat` and `uptime` over FUSE.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "cgprocfs", version, about)]
pub struct Config {
    /// Directory to mount the virtual tree at
    #[arg(env = "CGPROCFS_MOUNTPOINT")]
    pub mountpoint: PathBuf,

    /// Prefix under which host files are read, e.g. a bind mount of the host's `/`
    #[arg(long, env = "ROOTFS_MOUNT_PATH", default_value = "/")]
    pub rootfs: PathBuf,

    /// Seconds a rendered file is served from cache
    #[arg(long, env = "CGPROCFS_FRESHNESS_SECS", default_value_t = 10)]
    pub freshness_secs: u64,

    /// Seconds an unqueried cgroup stays cached
    #[arg(long, env = "CGPROCFS_RETENTION_SECS", default_value_t = 60)]
    pub retention_secs: u64,

    /// Milliseconds before a host file read or cgroup manager call is abandoned
    #[arg(long, env = "CGPROCFS_READ_TIMEOUT_MS", default_value_t = 2000)]
    pub read_timeout_ms: u64,

    /// Where cgroup control values are read from
    #[arg(
        long,
        env = "CGPROCFS_CONTROL_SOURCE",
        value_enum,
        default_value_t = ControlSourceKind::Files
    )]
    pub control_source: ControlSourceKind,

    /// cgmanager socket, resolved below the rootfs
    #[arg(long, env = "CGPROCFS_CGMANAGER_SOCKET", default_value = CGMANAGER_SOCKET)]
    pub cgmanager_socket: PathBuf,

    /// Answer requests on the FUSE session thread instead of a worker pool
    #[arg(long, env = "CGPROCFS_SINGLE_THREADED")]
    pub single_threaded: bool,

    /// Let users other than the mounting user access the tree
    #[arg(long, env = "CGPROCFS_ALLOW_OTHER")]
    pub allow_other: bool,
}

impl Config {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
