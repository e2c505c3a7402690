//! Cgroup v1 introspection for a requesting process.
//!
//! This module resolves which cgroup a process belongs to for a given
//! controller and reads that cgroup's control files below the controller's
//! mount point.
//!
//! # Key Components
//!
//! - [`CgroupKey`] — a controller-scoped cgroup path, the cache partition key.
//! - [`cgroup_path`] — resolves a pid to its [`CgroupKey`] via `/proc/<pid>/cgroup`.
//! - [`ControlSource`] — where control values come from: [`FileSource`] reads
//!   the mounted hierarchy, [`CgmanagerSource`] asks cgmanager over D-Bus.
//! - [`read_control_value`] — reads one trimmed control value.
//! - [`MemoryControls`] — the memory controller values used to rewrite `meminfo`.
//! - [`read_tasks`] — the pids listed in a cgroup's `tasks` file.
//!
//! # Supported Control Files
//!
//! - `cpuset.cpus` and `tasks`
//! - `memory.limit_in_bytes`, `memory.memsw.limit_in_bytes`
//! - `memory.usage_in_bytes`, `memory.memsw.usage_in_bytes`
//! - `memory.stat`
mod control;
mod error;
mod membership;
mod source;
pub mod stats;

pub use control::{MemoryControls, read_control_value, read_cpuset, read_tasks};
pub use error::{Error, Result};
pub use membership::{CgroupKey, cgroup_path, parse_membership};
pub use source::{CGMANAGER_SOCKET, CgmanagerSource, ControlSource, FileSource};
