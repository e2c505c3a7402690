//! Generators for the virtualized `/proc` files.
//!
//! Each generator reads the host's version of a file and rewrites it with
//! values derived from the caller's cgroup. Generators hold no state; the
//! [`crate::engine`] decides when to run them and caches their output.

pub mod cpuinfo;
mod error;
pub mod meminfo;
pub mod stat;
pub mod uptime;

use std::fmt;

use crate::cache::EntryKind;

pub use error::{Error, Result};

/// The files served below `/proc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcFile {
    Cpuinfo,
    Meminfo,
    Stat,
    Uptime,
}

impl ProcFile {
    /// All files, in directory listing order.
    pub const ALL: [ProcFile; 4] = [
        ProcFile::Cpuinfo,
        ProcFile::Meminfo,
        ProcFile::Stat,
        ProcFile::Uptime,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ProcFile::Cpuinfo => "cpuinfo",
            ProcFile::Meminfo => "meminfo",
            ProcFile::Stat => "stat",
            ProcFile::Uptime => "uptime",
        }
    }

    /// Absolute path of the file, both on the host and in the virtual tree.
    pub fn path(self) -> &'static str {
        match self {
            ProcFile::Cpuinfo => "/proc/cpuinfo",
            ProcFile::Meminfo => "/proc/meminfo",
            ProcFile::Stat => "/proc/stat",
            ProcFile::Uptime => "/proc/uptime",
        }
    }

    /// The controller whose cgroup the file is rendered for.
    pub fn controller(self) -> &'static str {
        match self {
            ProcFile::Meminfo => "memory",
            ProcFile::Cpuinfo | ProcFile::Stat | ProcFile::Uptime => "cpuset",
        }
    }

    /// The cache record backing the file.
    ///
    /// Uptime moves with the wall clock, so only the oldest task start time
    /// behind it is cached.
    pub fn entry_kind(self) -> EntryKind {
        match self {
            ProcFile::Cpuinfo => EntryKind::Cpuinfo,
            ProcFile::Meminfo => EntryKind::Meminfo,
            ProcFile::Stat => EntryKind::Stat,
            ProcFile::Uptime => EntryKind::OldestTask,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|file| file.file_name() == name)
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|file| file.path() == path)
    }
}

impl fmt::Display for ProcFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_path() {
        for file in ProcFile::ALL {
            assert_eq!(ProcFile::from_file_name(file.file_name()), Some(file));
            assert_eq!(ProcFile::from_path(file.path()), Some(file));
        }
        assert_eq!(ProcFile::from_path("/proc/foo"), None);
        assert_eq!(ProcFile::from_file_name("stat2"), None);
    }

    #[test]
    fn test_controllers() {
        assert_eq!(ProcFile::Meminfo.controller(), "memory");
        assert_eq!(ProcFile::Uptime.controller(), "cpuset");
    }
}
