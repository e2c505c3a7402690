//! Typed parsers for cgroup v1 control files.

mod error;
mod memory;
mod parser;

pub use error::StatParseError;
pub use memory::{ByteCount, MemoryStat};
pub use parser::{KeyValueStat, SingleLineStat};
