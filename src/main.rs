use clap::Parser;

/// Entry point for cgprocfs.
///
/// Mounts per-container views of `/proc/cpuinfo`, `/proc/meminfo`,
/// `/proc/stat` and `/proc/uptime` and serves them until unmounted.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info cgprocfs --allow-other /var/lib/cgprocfs
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = cgprocfs::Config::parse();
    cgprocfs::run(config)
}
