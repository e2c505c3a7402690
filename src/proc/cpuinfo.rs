//! `/proc/cpuinfo` restricted to the cgroup's cpuset.

use std::collections::HashMap;
use std::path::Path;

use crate::fsutil::HostFs;

use super::{Error, ProcFile, Result};

/// Renders `cpuinfo` for a cgroup whose cpuset expands to `cpus`.
///
/// # Errors
///
/// - [`Error::Read`] if host `/proc/cpuinfo` cannot be read.
/// - [`Error::MalformedHostData`] if a `processor` value is not a number.
/// - [`Error::InconsistentTopology`] if a cpu in `cpus` has no block on the host.
pub fn render(host: &HostFs, cpus: &[u32]) -> Result<String> {
    let path = ProcFile::Cpuinfo.path();
    let content = host.read_to_string(path)?;
    rewrite(&content, Path::new(path), cpus)
}

/// A blank-line separated section of `cpuinfo`.
#[derive(Debug)]
struct Block<'a> {
    lines: Vec<&'a str>,
    processor_line: usize,
}

/// Emits the host block of each cpu in `cpus`, in that order, with the
/// `processor` field renumbered to the cpu's position.
///
/// Blocks without a `processor` field (e.g. trailing per-machine sections
/// on some architectures) are dropped.
pub fn rewrite(content: &str, origin: &Path, cpus: &[u32]) -> Result<String> {
    let blocks = index_blocks(content, origin)?;

    let mut out = String::with_capacity(content.len());
    for (position, cpu) in cpus.iter().enumerate() {
        let block = blocks.get(cpu).ok_or(Error::InconsistentTopology {
            file: ProcFile::Cpuinfo.path(),
            cpu: *cpu,
        })?;
        if position > 0 {
            out.push('\n');
        }
        for (idx, line) in block.lines.iter().enumerate() {
            if idx == block.processor_line {
                let (key, _) = line.split_once(':').unwrap_or((*line, ""));
                out.push_str(&format!("{key}: {position}\n"));
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    Ok(out)
}

fn index_blocks<'a>(content: &'a str, origin: &Path) -> Result<HashMap<u32, Block<'a>>> {
    let mut blocks = HashMap::new();
    let mut lines = Vec::new();
    let mut processor = None;

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            if let Some((id, processor_line)) = processor.take() {
                blocks.insert(
                    id,
                    Block {
                        lines: std::mem::take(&mut lines),
                        processor_line,
                    },
                );
            }
            lines.clear();
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "processor" {
                let id = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|err| Error::MalformedHostData {
                        path: origin.to_path_buf(),
                        line: idx + 1,
                        reason: format!("invalid processor id `{}`: {err}", value.trim()),
                    })?;
                processor = Some((id, lines.len()));
            }
        }
        lines.push(line);
    }
    if let Some((id, processor_line)) = processor {
        blocks.insert(
            id,
            Block {
                lines,
                processor_line,
            },
        );
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeHost, host_cpuinfo};

    fn origin() -> &'static Path {
        Path::new("/proc/cpuinfo")
    }

    #[test]
    fn test_selects_and_renumbers_blocks() {
        let host = host_cpuinfo(8);
        let out = rewrite(&host, origin(), &[2, 5, 6]).unwrap();

        let blocks: Vec<&str> = out.trim_end().split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("processor\t: 0\n"));
        assert!(blocks[0].contains("core id\t\t: 2"));
        assert!(blocks[1].starts_with("processor\t: 1\n"));
        assert!(blocks[1].contains("core id\t\t: 5"));
        assert!(blocks[2].starts_with("processor\t: 2\n"));
        assert!(blocks[2].contains("core id\t\t: 6"));
        assert!(out.ends_with('\n'));
        assert!(!out.ends_with("\n\n"));
    }

    #[test]
    fn test_follows_declared_order() {
        let out = rewrite(&host_cpuinfo(4), origin(), &[3, 1]).unwrap();
        let blocks: Vec<&str> = out.trim_end().split("\n\n").collect();
        assert!(blocks[0].starts_with("processor\t: 0\n"));
        assert!(blocks[0].contains("core id\t\t: 3"));
        assert!(blocks[1].contains("core id\t\t: 1"));
    }

    #[test]
    fn test_indexes_by_processor_field() {
        // cpu 1 is offline, so positions and ids differ.
        let host = "processor\t: 0\nflags\t: a\n\nprocessor\t: 2\nflags\t: c\n\n";
        let out = rewrite(host, origin(), &[2]).unwrap();
        assert_eq!(out, "processor\t: 0\nflags\t: c\n");
    }

    #[test]
    fn test_missing_cpu_is_inconsistent() {
        let err = rewrite(&host_cpuinfo(4), origin(), &[1, 7]).unwrap_err();
        match err {
            Error::InconsistentTopology { cpu, .. } => assert_eq!(cpu, 7),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_processor_id() {
        let err = rewrite("processor\t: x\n", origin(), &[0]).unwrap_err();
        match err {
            Error::MalformedHostData { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drops_blocks_without_processor() {
        let host = "processor\t: 0\nBogoMIPS\t: 50\n\nHardware\t: BCM2835\nRevision\t: a\n";
        let out = rewrite(host, origin(), &[0]).unwrap();
        assert_eq!(out, "processor\t: 0\nBogoMIPS\t: 50\n");
    }

    #[test]
    fn test_empty_cpuset() {
        assert_eq!(rewrite(&host_cpuinfo(2), origin(), &[]).unwrap(), "");
    }

    #[test]
    fn test_render_reads_host_file() {
        let fake = FakeHost::container_host(8);
        let out = render(&fake.host_fs(), &[2, 5, 6]).unwrap();
        assert_eq!(out.matches("processor").count(), 3);
    }
}
