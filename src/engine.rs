//! Per-request rendering of virtual files.
//!
//! The [`Engine`] resolves the caller's cgroup for the file's controller,
//! serves the cached record while it is fresh, and otherwise regenerates it
//! under the record's recompute lock so concurrent misses compute once.

use std::path::Path;
use std::sync::{Arc, PoisonError};
use std::time::SystemTime;

use crate::cache::{self, ContentCache, EntryKind, Payload};
use crate::cgroup::{self, CgroupKey, ControlSource, MemoryControls};
use crate::fsutil::{HostFs, ReadError};
use crate::mounts::{self, ControllerTable};
use crate::proc::{self, ProcFile, cpuinfo, meminfo, stat, uptime};

/// Identity of the process that issued a filesystem request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Errors that fail a single request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cgroup(#[from] cgroup::Error),
    #[error(transparent)]
    Proc(#[from] proc::Error),
    #[error(transparent)]
    Cache(#[from] cache::Error),
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Cgroup(err) => err.is_timeout(),
            Error::Proc(err) => err.is_timeout(),
            Error::Read(err) => err.is_timeout(),
            Error::Cache(_) => false,
        }
    }

    /// The errno reported to the kernel for this failure.
    pub fn errno(&self) -> i32 {
        if self.is_timeout() {
            libc::ETIMEDOUT
        } else {
            libc::EIO
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Engine {
    host: HostFs,
    source: Arc<dyn ControlSource>,
    cache: ContentCache,
    startup_controllers: Arc<ControllerTable>,
}

impl Engine {
    /// Creates an engine.
    ///
    /// # Arguments
    ///
    /// * `host` - Host filesystem access.
    /// * `source` - Where cgroup control values are read from.
    /// * `cache` - The content cache shared by all requests.
    /// * `controllers` - Controller table built at startup. It decides whether
    ///   a process without a cgroup for a controller gets host content, and
    ///   stands in when rebuilding the table fails.
    pub fn new(
        host: HostFs,
        source: Arc<dyn ControlSource>,
        cache: ContentCache,
        controllers: ControllerTable,
    ) -> Self {
        Self {
            host,
            source,
            cache,
            startup_controllers: Arc::new(controllers),
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Renders `file` as seen by the caller.
    ///
    /// Content of a file whose controller is not mounted on the host is the
    /// host's own content, unless the control source does not read the
    /// mounted hierarchy.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller's cgroup cannot be resolved, one of its
    /// control files or a host file cannot be read, or the host data is
    /// inconsistent with the cgroup's settings.
    pub fn render(&self, file: ProcFile, ctx: &CallerContext) -> Result<Arc<str>> {
        let controller = file.controller();
        let cgroup = match cgroup::cgroup_path(&self.host, ctx.pid, controller) {
            Ok(cgroup) => cgroup,
            Err(cgroup::Error::NotFound { .. })
                if self.startup_controllers.get(controller).is_none() =>
            {
                return self.host_content(file);
            }
            Err(err) => return Err(err.into()),
        };
        log::trace!(
            "rendering {file} for pid={} uid={} gid={} in cgroup `{cgroup}`",
            ctx.pid,
            ctx.uid,
            ctx.gid
        );

        let controllers = self.controller_table(&cgroup)?;
        let mount = match controllers.get(controller) {
            Some(mount) => mount,
            None if self.source.needs_mounts() => return self.host_content(file),
            None => Path::new(""),
        };

        let kind = file.entry_kind();
        self.refresh(&cgroup, kind, || self.generate(file, mount, &cgroup))?;
        match file {
            ProcFile::Uptime => {
                let oldest_start = self.cache.get_timestamp(&cgroup, kind)?;
                let text = uptime::render(&self.host, oldest_start, SystemTime::now())?;
                Ok(text.into())
            }
            ProcFile::Cpuinfo | ProcFile::Meminfo | ProcFile::Stat => {
                Ok(self.cache.get_text(&cgroup, kind)?)
            }
        }
    }

    fn generate(&self, file: ProcFile, mount: &Path, cgroup: &CgroupKey) -> Result<Payload> {
        let payload = match file {
            ProcFile::Cpuinfo => {
                let cpus = cgroup::read_cpuset(self.source.as_ref(), mount, cgroup)?;
                Payload::Text(cpuinfo::render(&self.host, &cpus)?.into())
            }
            ProcFile::Meminfo => {
                let controls = MemoryControls::read(self.source.as_ref(), mount, cgroup);
                Payload::Text(meminfo::render(&self.host, &controls)?.into())
            }
            ProcFile::Stat => {
                let cpus = cgroup::read_cpuset(self.source.as_ref(), mount, cgroup)?;
                Payload::Text(stat::render(&self.host, &cpus)?.into())
            }
            ProcFile::Uptime => Payload::Timestamp(uptime::oldest_task_start(
                &self.host,
                self.source.as_ref(),
                mount,
                cgroup,
            )?),
        };
        Ok(payload)
    }

    /// Returns the controller table cached for `cgroup`, rebuilding it from
    /// `/proc/mounts` once stale.
    fn controller_table(&self, cgroup: &CgroupKey) -> Result<Arc<ControllerTable>> {
        self.refresh(cgroup, EntryKind::Controllers, || {
            let table = match mounts::controller_table(&self.host) {
                Ok(table) => Arc::new(table),
                Err(err) => {
                    log::warn!("failed to rebuild cgroup controller table, using startup table: {err}");
                    Arc::clone(&self.startup_controllers)
                }
            };
            Ok(Payload::Controllers(table))
        })?;
        Ok(self.cache.get_controllers(cgroup, EntryKind::Controllers)?)
    }

    /// Makes sure a fresh `kind` record exists for `cgroup`.
    fn refresh(
        &self,
        cgroup: &CgroupKey,
        kind: EntryKind,
        generate: impl FnOnce() -> Result<Payload>,
    ) -> Result<()> {
        if self.cache.is_fresh(cgroup, kind) {
            return Ok(());
        }

        let lock = self.cache.recompute_lock(cgroup, kind);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another request may have regenerated the record while we waited.
        if self.cache.is_fresh(cgroup, kind) {
            return Ok(());
        }

        log::debug!("regenerating {kind} for cgroup `{cgroup}`");
        let payload = generate()?;
        self.cache.put(cgroup, kind, payload);
        Ok(())
    }

    fn host_content(&self, file: ProcFile) -> Result<Arc<str>> {
        log::debug!(
            "controller `{}` is not mounted, serving host {file}",
            file.controller()
        );
        Ok(self.host.read_to_string(file.path())?.into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cgroup::FileSource;
    use crate::testutil::{FakeHost, host_cpuinfo, host_stat};

    const CALLER: CallerContext = CallerContext {
        pid: 100,
        uid: 1000,
        gid: 1000,
    };

    fn engine_with(host: HostFs, cache: ContentCache) -> Engine {
        let controllers = mounts::controller_table(&host).unwrap();
        let source = Arc::new(FileSource::new(host.clone()));
        Engine::new(host, source, cache, controllers)
    }

    fn engine(fake: &FakeHost) -> Engine {
        engine_with(
            fake.host_fs(),
            ContentCache::new(Duration::from_secs(10), Duration::from_secs(60)),
        )
    }

    /// Control values held in memory, read without any mounted hierarchy.
    #[derive(Debug)]
    struct StaticSource(HashMap<&'static str, &'static str>);

    impl ControlSource for StaticSource {
        fn read_value(
            &self,
            _mount: &Path,
            cgroup: &CgroupKey,
            key: &str,
        ) -> cgroup::Result<String> {
            self.0
                .get(key)
                .map(|value| (*value).to_owned())
                .ok_or_else(|| cgroup::Error::ControlRead {
                    cgroup: cgroup.clone(),
                    key: key.to_owned(),
                    source: ReadError::Io {
                        path: key.into(),
                        source: std::io::ErrorKind::NotFound.into(),
                    },
                })
        }

        fn needs_mounts(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_render_cpuinfo() {
        let fake = FakeHost::container_host(8);
        let out = engine(&fake).render(ProcFile::Cpuinfo, &CALLER).unwrap();

        assert_eq!(out.matches("processor").count(), 3);
        assert!(out.starts_with("processor\t: 0\n"));
        assert!(out.contains("processor\t: 2\n"));
        assert!(!out.contains("processor\t: 3\n"));
    }

    #[test]
    fn test_render_meminfo() {
        let fake = FakeHost::container_host(8);
        let out = engine(&fake).render(ProcFile::Meminfo, &CALLER).unwrap();

        assert!(out.starts_with("MemTotal:        1953125 kB\n"));
        assert!(out.contains("MemFree:         1464844 kB\n"));
        assert!(out.contains("MemAvailable:    1464844 kB\n"));
    }

    #[test]
    fn test_meminfo_without_usage_stays_within_limit() {
        let fake = FakeHost::container_host(8);
        fake.remove("/sys/fs/cgroup/memory/lxc/c1/memory.usage_in_bytes");
        let out = engine(&fake).render(ProcFile::Meminfo, &CALLER).unwrap();

        assert!(out.starts_with("MemTotal:        1953125 kB\n"));
        assert!(out.contains("MemFree:         1953125 kB\n"));
        assert!(out.contains("MemAvailable:    1953125 kB\n"));
    }

    #[test]
    fn test_render_stat() {
        let fake = FakeHost::container_host(8);
        let out = engine(&fake).render(ProcFile::Stat, &CALLER).unwrap();

        assert!(out.contains("cpu0 102 "));
        assert!(out.contains("cpu2 106 "));
        assert!(!out.contains("cpu3 "));
        assert!(out.ends_with("processes 4242\n"));
    }

    #[test]
    fn test_render_uptime() {
        let fake = FakeHost::container_host(8);
        let out = engine(&fake).render(ProcFile::Uptime, &CALLER).unwrap();

        let (uptime, idle) = out.trim_end().split_once(' ').unwrap();
        let uptime: f64 = uptime.parse().unwrap();
        assert!((0.0..60.0).contains(&uptime));
        assert_eq!(idle, "1234567.89");
    }

    #[test]
    fn test_fresh_record_is_reused() {
        let fake = FakeHost::container_host(8);
        let engine = engine(&fake);

        let first = engine.render(ProcFile::Cpuinfo, &CALLER).unwrap();
        fake.write("/sys/fs/cgroup/cpuset/lxc/c1/cpuset.cpus", "0\n");
        let second = engine.render(ProcFile::Cpuinfo, &CALLER).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_stale_record_is_regenerated() {
        let fake = FakeHost::container_host(8);
        let engine = engine_with(
            fake.host_fs(),
            ContentCache::new(Duration::ZERO, Duration::from_secs(60)),
        );

        let first = engine.render(ProcFile::Stat, &CALLER).unwrap();
        fake.write("/sys/fs/cgroup/cpuset/lxc/c1/cpuset.cpus", "0\n");
        let second = engine.render(ProcFile::Stat, &CALLER).unwrap();

        assert!(first.contains("cpu2 "));
        assert!(!second.contains("cpu1 "));
        assert!(second.contains("cpu0 100 "));
    }

    #[test]
    fn test_records_are_per_cgroup() {
        let fake = FakeHost::container_host(8);
        fake.write("/proc/200/cgroup", "3:cpuset:/lxc/c2\n5:memory:/lxc/c2\n");
        fake.write("/sys/fs/cgroup/cpuset/lxc/c2/cpuset.cpus", "0-3\n");
        let engine = engine(&fake);

        let c1 = engine.render(ProcFile::Cpuinfo, &CALLER).unwrap();
        let c2 = engine
            .render(ProcFile::Cpuinfo, &CallerContext { pid: 200, ..CALLER })
            .unwrap();

        assert_eq!(c1.matches("processor").count(), 3);
        assert_eq!(c2.matches("processor").count(), 4);
    }

    #[test]
    fn test_unknown_process() {
        let fake = FakeHost::container_host(8);
        let err = engine(&fake)
            .render(ProcFile::Meminfo, &CallerContext { pid: 999, ..CALLER })
            .unwrap_err();

        assert!(matches!(err, Error::Cgroup(cgroup::Error::NotFound { .. })));
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn test_inconsistent_topology() {
        let fake = FakeHost::container_host(8);
        fake.write("/sys/fs/cgroup/cpuset/lxc/c1/cpuset.cpus", "2,9\n");
        let err = engine(&fake).render(ProcFile::Stat, &CALLER).unwrap_err();

        assert!(matches!(
            err,
            Error::Proc(proc::Error::InconsistentTopology { cpu: 9, .. })
        ));
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn test_unmounted_controller_serves_host_content() {
        let fake = FakeHost::container_host(8);
        fake.write(
            "/proc/mounts",
            "cgroup /sys/fs/cgroup/memory cgroup rw,memory 0 0\n",
        );
        fake.write("/proc/100/cgroup", "5:memory:/lxc/c1\n");
        let engine = engine(&fake);

        assert_eq!(
            &*engine.render(ProcFile::Cpuinfo, &CALLER).unwrap(),
            host_cpuinfo(8)
        );
        assert_eq!(
            &*engine.render(ProcFile::Stat, &CALLER).unwrap(),
            host_stat(8)
        );
        assert!(
            engine
                .render(ProcFile::Meminfo, &CALLER)
                .unwrap()
                .starts_with("MemTotal:        1953125 kB\n")
        );
    }

    #[test]
    fn test_hung_control_read_times_out() {
        let fake = FakeHost::container_host(8);
        let fifo = fake.make_fifo("/sys/fs/cgroup/cpuset/lxc/c1/cpuset.cpus");
        let engine = engine_with(
            fake.host_fs_with_timeout(Duration::from_millis(200)),
            ContentCache::new(Duration::from_secs(10), Duration::from_secs(60)),
        );

        let started = Instant::now();
        let err = engine.render(ProcFile::Cpuinfo, &CALLER).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match &err {
            Error::Cgroup(cgroup::Error::ControlRead { key, source, .. }) => {
                assert_eq!(key, "cpuset.cpus");
                assert!(source.is_timeout());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_timeout());
        assert_eq!(err.errno(), libc::ETIMEDOUT);

        // Unblock the abandoned read so the runtime can shut down.
        drop(std::fs::OpenOptions::new().write(true).open(&fifo).unwrap());
    }

    #[test]
    fn test_mount_free_source_renders_unmounted_controllers() {
        let fake = FakeHost::container_host(8);
        fake.write("/proc/mounts", "proc /proc proc rw 0 0\n");
        let host = fake.host_fs();
        let controllers = mounts::controller_table(&host).unwrap();
        let source = StaticSource(HashMap::from([("cpuset.cpus", "1,3\n"), ("tasks", "100\n")]));
        let engine = Engine::new(
            host,
            Arc::new(source),
            ContentCache::new(Duration::from_secs(10), Duration::from_secs(60)),
            controllers,
        );

        let cpuinfo = engine.render(ProcFile::Cpuinfo, &CALLER).unwrap();
        assert_eq!(cpuinfo.matches("processor").count(), 2);
        assert!(cpuinfo.contains("core id\t\t: 3\n"));
        let stat = engine.render(ProcFile::Stat, &CALLER).unwrap();
        assert!(stat.contains("cpu1 103 "));
        assert!(!stat.contains("cpu2 "));
        assert!(engine.render(ProcFile::Uptime, &CALLER).is_ok());
    }

    #[test]
    fn test_cache_error_maps_to_eio() {
        let err = Error::Cache(cache::Error::Miss {
            cgroup: CgroupKey::new("cpuset", "/"),
            kind: EntryKind::Stat,
        });
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn test_concurrent_renders() {
        let fake = FakeHost::container_host(8);
        let engine = Arc::new(engine(&fake));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for file in ProcFile::ALL {
                        engine.render(file, &CALLER).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.cache().len(), 2);
    }

    #[test]
    fn test_concurrent_misses_generate_once() {
        let fake = FakeHost::container_host(8);
        let engine = Arc::new(engine(&fake));
        let cgroup = CgroupKey::new("cpuset", "/lxc/c1");
        let generated = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let cgroup = cgroup.clone();
                let generated = Arc::clone(&generated);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    engine
                        .refresh(&cgroup, EntryKind::Cpuinfo, || {
                            generated.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            Ok(Payload::Text("processor\t: 0\n".into()))
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(generated.load(Ordering::SeqCst), 1);
        assert_eq!(
            &*engine
                .cache()
                .get_text(&cgroup, EntryKind::Cpuinfo)
                .unwrap(),
            "processor\t: 0\n"
        );
    }
}
