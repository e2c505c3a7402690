//! `/proc/uptime` measured from the start of the cgroup's oldest task.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::cgroup::{self, CgroupKey, ControlSource};
use crate::fsutil::HostFs;

use super::{Error, ProcFile, Result};

/// Renders `uptime` as the time elapsed between `oldest_start` and `now`.
///
/// The idle time field is taken from the host unchanged.
///
/// # Errors
///
/// - [`Error::Read`] if host `/proc/uptime` cannot be read.
/// - [`Error::MalformedHostData`] if it does not hold two fields.
pub fn render(host: &HostFs, oldest_start: SystemTime, now: SystemTime) -> Result<String> {
    let path = ProcFile::Uptime.path();
    let content = host.read_to_string(path)?;
    let uptime = now.duration_since(oldest_start).unwrap_or(Duration::ZERO);
    rewrite(&content, Path::new(path), uptime)
}

/// Replaces the first field of host `uptime` content with `uptime`.
pub fn rewrite(content: &str, origin: &Path, uptime: Duration) -> Result<String> {
    let mut fields = content.split_whitespace();
    let (Some(_), Some(idle)) = (fields.next(), fields.next()) else {
        return Err(Error::MalformedHostData {
            path: origin.to_path_buf(),
            line: 1,
            reason: format!("expected two fields, found `{}`", content.trim()),
        });
    };
    Ok(format!("{:.2} {idle}\n", uptime.as_secs_f64()))
}

/// Finds the earliest start time among the tasks of `cgroup`.
///
/// The pids come from the cgroup's `tasks` control read through `source`; a
/// task's start time is the inode change time of its `/proc/<pid>` directory
/// on the host. Tasks that exit while being scanned are skipped.
///
/// # Errors
///
/// - [`Error::Cgroup`] if the `tasks` file cannot be read, or with
///   [`cgroup::Error::NoTasks`] if no listed task is still alive.
/// - [`Error::Read`] if a task directory cannot be inspected for another reason.
pub fn oldest_task_start(
    host: &HostFs,
    source: &dyn ControlSource,
    mount: &Path,
    cgroup: &CgroupKey,
) -> Result<SystemTime> {
    let mut oldest: Option<SystemTime> = None;
    for pid in cgroup::read_tasks(source, mount, cgroup)? {
        let started = match host.changed_at(format!("/proc/{pid}")) {
            Ok(started) => started,
            Err(err) if err.is_not_found() => {
                log::trace!("task {pid} of cgroup `{cgroup}` exited during scan");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        oldest = Some(oldest.map_or(started, |current| current.min(started)));
    }

    oldest.ok_or_else(|| {
        cgroup::Error::NoTasks {
            cgroup: cgroup.clone(),
        }
        .into()
    })
}
