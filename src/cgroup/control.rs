use std::path::Path;

use crate::error::ResultOkLogExt;
use crate::range;

use super::stats::{ByteCount, KeyValueStat, MemoryStat, SingleLineStat};
use super::{CgroupKey, ControlSource, Error, Result};

/// Reads a single control value of `cgroup` and trims it.
///
/// # Arguments
///
/// * `source` - Where control values are read from.
/// * `mount` - Host mount path of the cgroup's controller.
/// * `cgroup` - The cgroup to read from.
/// * `key` - Control file name, e.g. `cpuset.cpus`.
///
/// # Errors
///
/// Returns [`Error::ControlRead`] (or a `Manager*` error for the cgroup
/// manager) if the cgroup vanished, the key is not supported by the running
/// kernel, access is denied, or the read timed out.
pub fn read_control_value(
    source: &dyn ControlSource,
    mount: &Path,
    cgroup: &CgroupKey,
    key: &str,
) -> Result<String> {
    source
        .read_value(mount, cgroup, key)
        .map(|value| value.trim().to_owned())
}

/// Reads `cpuset.cpus` and expands it into host CPU ids in declared order.
///
/// # Errors
///
/// - [`Error::ControlRead`] if the control file cannot be read.
/// - [`Error::MalformedRange`] if its content is not a valid CPU list.
pub fn read_cpuset(
    source: &dyn ControlSource,
    mount: &Path,
    cgroup: &CgroupKey,
) -> Result<Vec<u32>> {
    let value = read_control_value(source, mount, cgroup, "cpuset.cpus")?;
    range::expand(&value).map_err(|source| Error::MalformedRange {
        cgroup: cgroup.clone(),
        source,
    })
}

/// Reads the pids listed in the cgroup's `tasks` file.
///
/// # Errors
///
/// - [`Error::ControlRead`] if the file cannot be read.
/// - [`Error::ControlParse`] if a line is not a pid.
pub fn read_tasks(
    source: &dyn ControlSource,
    mount: &Path,
    cgroup: &CgroupKey,
) -> Result<Vec<u32>> {
    let value = read_control_value(source, mount, cgroup, "tasks")?;
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u32>().map_err(|err| Error::ControlParse {
                cgroup: cgroup.clone(),
                key: "tasks".to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            })
        })
        .collect()
}

/// Memory controller values of one cgroup, in bytes.
///
/// Each value is optional: a control file that cannot be read or parsed
/// (e.g. `memsw` files when swap accounting is disabled) leaves the field
/// `None`, and the fields of `meminfo` that depend on it keep their host values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryControls {
    pub limit: Option<u64>,
    pub memsw_limit: Option<u64>,
    pub usage: Option<u64>,
    pub memsw_usage: Option<u64>,
    pub stat: Option<MemoryStat>,
}

impl MemoryControls {
    /// Reads all memory control values of `cgroup`; `mount` is the memory
    /// controller's host mount path.
    pub fn read(source: &dyn ControlSource, mount: &Path, cgroup: &CgroupKey) -> Self {
        let count = |key: &str| {
            read_parsed(source, mount, cgroup, key, |value| {
                ByteCount::from_reader(&mut value.as_bytes()).map(|bytes| bytes.0)
            })
        };

        Self {
            limit: count("memory.limit_in_bytes"),
            memsw_limit: count("memory.memsw.limit_in_bytes"),
            usage: count("memory.usage_in_bytes"),
            memsw_usage: count("memory.memsw.usage_in_bytes"),
            stat: read_parsed(source, mount, cgroup, "memory.stat", |value| {
                MemoryStat::from_reader(&mut value.as_bytes())
            }),
        }
    }
}

fn read_parsed<T>(
    source: &dyn ControlSource,
    mount: &Path,
    cgroup: &CgroupKey,
    key: &str,
    parse: impl FnOnce(&str) -> std::io::Result<T>,
) -> Option<T> {
    read_control_value(source, mount, cgroup, key)
        .and_then(|value| {
            parse(&value).map_err(|source| Error::ControlParse {
                cgroup: cgroup.clone(),
                key: key.to_owned(),
                source,
            })
        })
        .ok_log()
}
