//! Parsers for the cgroup v1 memory controller.
//!
//! - `memory.stat` is parsed into [`MemoryStat`]; only the hierarchical page
//!   cache counter is kept, the rest of the file is ignored.
//! - `memory.limit_in_bytes`, `memory.usage_in_bytes` and their `memsw`
//!   counterparts are parsed into [`ByteCount`].
//!
//! # Examples
//!
//! ```rust
//! use cgprocfs::cgroup::stats::{ByteCount, KeyValueStat, MemoryStat, SingleLineStat};
//!
//! let stat = MemoryStat::from_reader(&mut "cache 4096\ntotal_cache 8192\n".as_bytes()).unwrap();
//! assert_eq!(stat.total_cache, 8192);
//!
//! let limit = ByteCount::from_reader(&mut "9223372036854771712\n".as_bytes()).unwrap();
//! assert_eq!(limit.0, 9223372036854771712);
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use super::parser::KeyValueStat;
use super::{SingleLineStat, StatParseError};

/// Counters from a cgroup v1 `memory.stat` file, in bytes.
///
/// Only the hierarchical page cache is kept; it backs `Cached` in `meminfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    /// Page cache including descendants.
    pub total_cache: u64,
}

type Setter = fn(&mut MemoryStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(1);
    m.insert("total_cache", |s, v| s.total_cache = v);
    m
});

impl KeyValueStat for MemoryStat {
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// A byte count from a single-value file such as `memory.limit_in_bytes`.
///
/// An unlimited v1 limit is reported by the kernel as a very large number
/// (`PAGE_COUNTER_MAX` pages), which is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCount(pub u64);

impl SingleLineStat for ByteCount {
    /// # Errors
    ///
    /// Returns an error of kind `std::io::ErrorKind::InvalidData` if the value cannot be parsed as a `u64`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let line = line.trim();
        let value = line
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidValue {
                value: line.to_string(),
                line: 1,
                source,
            })?;

        Ok(ByteCount(value))
    }
}
