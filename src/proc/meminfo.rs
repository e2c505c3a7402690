//! `/proc/meminfo` bounded by the cgroup's memory controller.
//!
//! The host file is parsed into ordered `key: value [unit]` lines. A fixed
//! sequence of rewrite rules then replaces selected values with figures
//! derived from the cgroup's control files. Later rules read the results of
//! earlier ones, so [`REWRITE_ORDER`] must not be reordered.

use std::fmt::{self, Write};
use std::path::Path;

use crate::cgroup::MemoryControls;
use crate::fsutil::HostFs;

use super::{Error, ProcFile, Result};

/// Renders `meminfo` for a cgroup with the given memory controls.
///
/// # Errors
///
/// - [`Error::Read`] if host `/proc/meminfo` cannot be read.
/// - [`Error::MalformedHostData`] if a host line is not `key: value [unit]`.
pub fn render(host: &HostFs, controls: &MemoryControls) -> Result<String> {
    let path = ProcFile::Meminfo.path();
    let content = host.read_to_string(path)?;
    rewrite(&content, Path::new(path), controls)
}

/// Applies [`REWRITE_ORDER`] to host `meminfo` content.
///
/// A rule whose cgroup input is missing from `controls` leaves its field at
/// the host value, except that free memory and swap never exceed the
/// rewritten totals and `MemAvailable` always equals `MemFree`. Keys absent
/// from the host are never added.
pub fn rewrite(content: &str, origin: &Path, controls: &MemoryControls) -> Result<String> {
    let mut info = Meminfo::parse(content, origin)?;
    for rule in REWRITE_ORDER {
        if let Some(value) = rule.value(&info, controls) {
            info.set(rule.key(), value);
        }
    }
    Ok(info.to_string())
}

/// One line of `meminfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemLine<'a> {
    key: &'a str,
    value: u64,
    unit: Option<&'a str>,
}

#[derive(Debug)]
struct Meminfo<'a> {
    lines: Vec<MemLine<'a>>,
}

impl<'a> Meminfo<'a> {
    fn parse(content: &'a str, origin: &Path) -> Result<Self> {
        let malformed = |line: usize, reason: String| Error::MalformedHostData {
            path: origin.to_path_buf(),
            line,
            reason,
        };

        let mut lines = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, rest) = line
                .split_once(':')
                .ok_or_else(|| malformed(idx + 1, format!("missing `:` in `{line}`")))?;
            let mut parts = rest.split_whitespace();
            let value = parts
                .next()
                .ok_or_else(|| malformed(idx + 1, format!("missing value for `{key}`")))?;
            let value = value
                .parse::<u64>()
                .map_err(|err| malformed(idx + 1, format!("invalid value `{value}`: {err}")))?;

            lines.push(MemLine {
                key: key.trim(),
                value,
                unit: parts.next(),
            });
        }

        Ok(Self { lines })
    }

    fn get(&self, key: &str) -> Option<u64> {
        self.lines
            .iter()
            .find(|line| line.key == key)
            .map(|line| line.value)
    }

    fn set(&mut self, key: &str, value: u64) {
        if let Some(line) = self.lines.iter_mut().find(|line| line.key == key) {
            line.value = value;
        }
    }
}

impl fmt::Display for Meminfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut key = String::new();
        for line in &self.lines {
            key.clear();
            write!(key, "{}:", line.key)?;
            write!(f, "{key:<15} {:>8}", line.value)?;
            if let Some(unit) = line.unit {
                write!(f, " {unit}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Fields rewritten from cgroup values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    MemTotal,
    SwapTotal,
    MemFree,
    SwapFree,
    MemAvailable,
    Cached,
    Buffers,
    SwapCached,
}

/// Rule application order. `MemFree` reads the rewritten `MemTotal`,
/// `SwapFree` the rewritten `SwapTotal`, and `MemAvailable` the rewritten
/// `MemFree`.
const REWRITE_ORDER: [Rule; 8] = [
    Rule::MemTotal,
    Rule::SwapTotal,
    Rule::MemFree,
    Rule::SwapFree,
    Rule::MemAvailable,
    Rule::Cached,
    Rule::Buffers,
    Rule::SwapCached,
];

impl Rule {
    fn key(self) -> &'static str {
        match self {
            Rule::MemTotal => "MemTotal",
            Rule::SwapTotal => "SwapTotal",
            Rule::MemFree => "MemFree",
            Rule::SwapFree => "SwapFree",
            Rule::MemAvailable => "MemAvailable",
            Rule::Cached => "Cached",
            Rule::Buffers => "Buffers",
            Rule::SwapCached => "SwapCached",
        }
    }

    /// The new value in KiB, or `None` to keep the host value.
    fn value(self, info: &Meminfo<'_>, controls: &MemoryControls) -> Option<u64> {
        match self {
            Rule::MemTotal => {
                let limit = controls.limit?;
                Some(info.get("MemTotal")?.min(limit / 1024))
            }
            Rule::SwapTotal => {
                let swap_limit = controls.memsw_limit?.saturating_sub(controls.limit?);
                Some(info.get("SwapTotal")?.min(swap_limit / 1024))
            }
            Rule::MemFree => {
                let total = info.get("MemTotal")?;
                match controls.usage {
                    Some(usage) => Some(total.saturating_sub(usage / 1024)),
                    None => Some(info.get("MemFree")?.min(total)),
                }
            }
            Rule::SwapFree => {
                let swap_free = || {
                    let swap_limit = controls.memsw_limit?.saturating_sub(controls.limit?);
                    let swap_usage = controls.memsw_usage?.saturating_sub(controls.usage?);
                    Some(swap_limit.saturating_sub(swap_usage) / 1024)
                };
                swap_free().or_else(|| Some(info.get("SwapFree")?.min(info.get("SwapTotal")?)))
            }
            Rule::MemAvailable => info.get("MemFree"),
            Rule::Cached => Some(controls.stat.as_ref()?.total_cache / 1024),
            Rule::Buffers | Rule::SwapCached => Some(0),
        }
    }
}
