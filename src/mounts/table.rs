use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fsutil::HostFs;

use super::parser::parse_mount_line;
use super::{Error, Result};

/// Controllers whose mount points are recorded in a [`ControllerTable`].
pub const KNOWN_CONTROLLERS: &[&str] = &[
    "cpuset",
    "cpu",
    "cpuacct",
    "memory",
    "devices",
    "freezer",
    "net_cls",
    "blkio",
    "perf_event",
    "hugetlb",
];

const MOUNTS_PATH: &str = "/proc/mounts";

/// Mapping from cgroup v1 controller name to its host mount path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerTable {
    mounts: HashMap<&'static str, PathBuf>,
}

impl ControllerTable {
    /// Returns the host mount path of `controller`, if it is mounted.
    pub fn get(&self, controller: &str) -> Option<&Path> {
        self.mounts.get(controller).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> {
        self.mounts.iter().map(|(name, path)| (*name, path.as_path()))
    }

    /// Builds the table from mount table content.
    ///
    /// Only filesystems of type `cgroup` are considered. A controller mounted
    /// more than once keeps its first mount point.
    ///
    /// # Arguments
    ///
    /// * `content` - Text in `/proc/mounts` format.
    /// * `origin` - Logical origin of the data, used in error messages.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`] if a line is missing one of its leading fields.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let mut table = Self::default();

        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = parse_mount_line(line).map_err(|source| Error::Parse {
                path: origin.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            if entry.fs_type != "cgroup" {
                continue;
            }

            for option in entry.options() {
                let Some(name) = KNOWN_CONTROLLERS.iter().find(|name| **name == option) else {
                    continue;
                };
                if table.mounts.contains_key(name) {
                    continue;
                }
                log::debug!(
                    "Found `{}` controller mounted at {}",
                    name,
                    entry.mount_point
                );
                table
                    .mounts
                    .insert(*name, PathBuf::from(entry.mount_point.as_ref()));
            }
        }

        Ok(table)
    }
}

/// Reads the host mount table and builds the [`ControllerTable`].
///
/// # Errors
///
/// - [`Error::Read`] if `/proc/mounts` cannot be read.
/// - [`Error::Parse`] if parsing any line fails.
pub fn controller_table(host: &HostFs) -> Result<ControllerTable> {
    let content = host.read_to_string(MOUNTS_PATH)?;
    ControllerTable::parse(&content, Path::new(MOUNTS_PATH))
}
