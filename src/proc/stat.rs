//! `/proc/stat` restricted to the cgroup's cpuset.

use std::collections::HashMap;

use crate::fsutil::HostFs;

use super::{Error, ProcFile, Result};

/// Renders `stat` for a cgroup whose cpuset expands to `cpus`.
///
/// # Errors
///
/// - [`Error::Read`] if host `/proc/stat` cannot be read.
/// - [`Error::InconsistentTopology`] if a cpu in `cpus` has no host line.
pub fn render(host: &HostFs, cpus: &[u32]) -> Result<String> {
    let content = host.read_to_string(ProcFile::Stat.path())?;
    rewrite(&content, cpus)
}

/// Replaces the host's per-cpu lines with those of `cpus`, renumbered from
/// zero in declared order.
///
/// The selected lines form one run where the host's per-cpu lines began.
/// All other lines, including the aggregate `cpu` line, are copied
/// byte for byte.
pub fn rewrite(content: &str, cpus: &[u32]) -> Result<String> {
    let per_cpu: HashMap<u32, &str> = content
        .split_inclusive('\n')
        .filter_map(split_cpu_line)
        .collect();

    let mut out = String::with_capacity(content.len());
    let mut emitted = false;
    for line in content.split_inclusive('\n') {
        if split_cpu_line(line).is_none() {
            out.push_str(line);
            continue;
        }
        if !emitted {
            emit_cpus(&mut out, &per_cpu, cpus)?;
            emitted = true;
        }
    }
    if !emitted {
        // Without a per-cpu run on the host only an empty cpuset is consistent.
        emit_cpus(&mut out, &per_cpu, cpus)?;
    }

    Ok(out)
}

fn emit_cpus(out: &mut String, per_cpu: &HashMap<u32, &str>, cpus: &[u32]) -> Result<()> {
    for (position, cpu) in cpus.iter().enumerate() {
        let counters = per_cpu.get(cpu).ok_or(Error::InconsistentTopology {
            file: ProcFile::Stat.path(),
            cpu: *cpu,
        })?;
        out.push_str("cpu");
        out.push_str(&position.to_string());
        out.push_str(counters);
    }
    Ok(())
}

/// Splits a `cpu<N> ...` line into `N` and the rest of the line.
fn split_cpu_line(line: &str) -> Option<(u32, &str)> {
    let rest = line.strip_prefix("cpu")?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let id = rest[..digits].parse().ok()?;
    Some((id, &rest[digits..]))
}
