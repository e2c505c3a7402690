//! Fake host root filesystems for unit tests.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fsutil::HostFs;

/// A temporary directory laid out like a host root filesystem, plus the tokio
/// runtime that [`HostFs`] reads through.
pub(crate) struct FakeHost {
    dir: tempfile::TempDir,
    runtime: tokio::runtime::Runtime,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("failed to build runtime");
        Self { dir, runtime }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.dir.path().join(path.trim_start_matches('/'))
    }

    /// Writes `content` to the absolute host path `path`, creating parents.
    pub(crate) fn write(&self, path: &str, content: &str) {
        let path = self.host_path(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, content).expect("failed to write fake host file");
    }

    pub(crate) fn mkdir(&self, path: &str) {
        std::fs::create_dir_all(self.host_path(path)).expect("failed to create fake host dir");
    }

    pub(crate) fn remove(&self, path: &str) {
        std::fs::remove_file(self.host_path(path)).expect("failed to remove fake host file");
    }

    /// Replaces the file at `path` with a FIFO that has no writer, so opening
    /// it for reading blocks. Returns the FIFO's real path.
    pub(crate) fn make_fifo(&self, path: &str) -> PathBuf {
        let path = self.host_path(path);
        if path.exists() {
            std::fs::remove_file(&path).expect("failed to remove fake host file");
        }
        let c_path = CString::new(path.as_os_str().as_bytes()).expect("nul byte in path");
        // SAFETY: `c_path` is a valid nul-terminated path that outlives the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
        path
    }

    pub(crate) fn runtime(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    pub(crate) fn host_fs(&self) -> HostFs {
        self.host_fs_with_timeout(Duration::from_secs(5))
    }

    pub(crate) fn host_fs_with_timeout(&self, timeout: Duration) -> HostFs {
        HostFs::new(self.dir.path(), self.runtime(), timeout)
    }

    /// Lays out a host with `cpus` CPUs, 16000000 kB of memory, cgroup v1
    /// `cpuset` and `memory` hierarchies, and pid 100 living in `/lxc/c1`.
    pub(crate) fn container_host(cpus: u32) -> Self {
        let fake = Self::new();
        fake.write("/proc/cpuinfo", &host_cpuinfo(cpus));
        fake.write("/proc/stat", &host_stat(cpus));
        fake.write("/proc/meminfo", HOST_MEMINFO);
        fake.write("/proc/uptime", "350735.47 1234567.89\n");
        fake.write(
            "/proc/mounts",
            "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
cgroup /sys/fs/cgroup/cpuset cgroup rw,nosuid,nodev,noexec,relatime,cpuset 0 0
cgroup /sys/fs/cgroup/memory cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0
",
        );
        fake.write(
            "/proc/100/cgroup",
            "\
5:memory:/lxc/c1
3:cpuset:/lxc/c1
2:cpu,cpuacct:/lxc/c1
",
        );
        fake.write("/sys/fs/cgroup/cpuset/lxc/c1/cpuset.cpus", "2,5-6\n");
        fake.write("/sys/fs/cgroup/cpuset/lxc/c1/tasks", "100\n");
        fake.write(
            "/sys/fs/cgroup/memory/lxc/c1/memory.limit_in_bytes",
            "2000000000\n",
        );
        fake.write(
            "/sys/fs/cgroup/memory/lxc/c1/memory.memsw.limit_in_bytes",
            "3000000000\n",
        );
        fake.write(
            "/sys/fs/cgroup/memory/lxc/c1/memory.usage_in_bytes",
            "500000000\n",
        );
        fake.write(
            "/sys/fs/cgroup/memory/lxc/c1/memory.memsw.usage_in_bytes",
            "600000000\n",
        );
        fake.write(
            "/sys/fs/cgroup/memory/lxc/c1/memory.stat",
            "cache 102400000\nrss 300000000\ntotal_cache 204800000\ntotal_rss 300000000\n",
        );
        fake
    }
}

pub(crate) const HOST_MEMINFO: &str = "\
MemTotal:       16000000 kB
MemFree:         8000000 kB
MemAvailable:   12000000 kB
Buffers:          400000 kB
Cached:          3000000 kB
SwapCached:         1000 kB
Active:          5000000 kB
SwapTotal:       4000000 kB
SwapFree:        3900000 kB
HugePages_Total:       0
Hugepagesize:       2048 kB
";

pub(crate) fn host_cpuinfo(cpus: u32) -> String {
    (0..cpus)
        .map(|id| {
            format!(
                "processor\t: {id}\nvendor_id\t: GenuineIntel\nmodel name\t: Test CPU @ 2.00GHz\ncore id\t\t: {id}\n\n"
            )
        })
        .collect()
}

pub(crate) fn host_stat(cpus: u32) -> String {
    let mut out = String::from("cpu  800 0 400 16000 0 0 0 0 0 0\n");
    for id in 0..cpus {
        out.push_str(&format!("cpu{id} 10{id} 0 5{id} 2000 0 0 0 0 0 0\n"));
    }
    out.push_str("intr 123456 0 0\nctxt 987654\nbtime 1700000000\nprocesses 4242\n");
    out
}
