use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use cache::ContentCache;
use cgroup::{CgmanagerSource, ControlSource, FileSource};
use config::ControlSourceKind;
use engine::Engine;
use fs::VirtualFs;
use fs::fuse::{Dispatch, FuseAdapter};
use fsutil::HostFs;

/// cgprocfs: per-container views of host kernel statistics.
///
/// Processes reading the mounted `/proc/cpuinfo`, `/proc/meminfo`, `/proc/stat`
/// and `/proc/uptime` see only the CPUs, memory limits and uptime of their own
/// cgroup. Content is rendered from the host's files and the caller's cgroup v1
/// control files, and cached per cgroup.
pub mod cache;
pub mod cgroup;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod fsutil;
pub mod mounts;
pub mod proc;
pub mod range;

#[cfg(test)]
mod testutil;

pub use config::Config;

/// Runs cgprocfs until the filesystem is unmounted.
///
/// # Errors
///
/// Possible errors include:
/// - Failure to build the tokio runtime.
/// - A rootfs without a `proc` directory.
/// - An unreadable or malformed `/proc/mounts`.
/// - An unreachable cgroup manager when it is the control source.
/// - Failure to mount the filesystem.
pub fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("cgprocfs-worker")
        .enable_all()
        .build()?;

    let served = serve(&config, runtime.handle());
    shutdown(runtime, config.read_timeout());
    served?;

    log::info!("unmounted `{}`", config.mountpoint.display());
    Ok(())
}

fn serve(config: &Config, runtime: &tokio::runtime::Handle) -> Result<(), Box<dyn Error>> {
    let rootfs = config.rootfs.as_path();
    if !rootfs.join("proc").try_exists()? {
        return Err(format!("missing host `/proc` below rootfs `{}`", rootfs.display()).into());
    }
    log::debug!("Final rootfs: {}", rootfs.display());

    let host = HostFs::new(rootfs, runtime.clone(), config.read_timeout());
    let controllers = mounts::controller_table(&host)?;
    if controllers.is_empty() {
        log::warn!("no cgroup v1 controllers mounted");
    }
    for (controller, mount) in controllers.iter() {
        log::debug!("controller `{controller}` mounted at `{}`", mount.display());
    }

    let source: Arc<dyn ControlSource> = match config.control_source {
        ControlSourceKind::Files => Arc::new(FileSource::new(host.clone())),
        ControlSourceKind::Cgmanager => {
            let socket = host.resolve(&config.cgmanager_socket);
            Arc::new(CgmanagerSource::connect(
                &socket,
                runtime.clone(),
                config.read_timeout(),
            )?)
        }
    };
    log::info!("reading cgroup controls from {:?}", config.control_source);

    let cache = ContentCache::new(config.freshness(), config.retention());
    let engine = Arc::new(Engine::new(host, source, cache, controllers));
    let fs = Arc::new(VirtualFs::new(engine));

    let dispatch = if config.single_threaded {
        Dispatch::Inline
    } else {
        Dispatch::Concurrent(runtime.clone())
    };
    fs::fuse::mount(
        FuseAdapter::new(fs, dispatch),
        &config.mountpoint,
        config.allow_other,
    )?;
    Ok(())
}

/// Stops `runtime`, waiting at most `grace` for reads still blocked on a hung
/// cgroup file or manager call. Those reads are leaked.
fn shutdown(runtime: tokio::runtime::Runtime, grace: Duration) {
    runtime.shutdown_timeout(grace);
}
