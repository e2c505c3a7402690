//! Generic traits for parsing cgroup v1 control files into structured types.
//!
//! # Traits
//!
//! - [`KeyValueStat`]: multi-line files with one whitespace-separated `key value`
//!   pair per line, such as `memory.stat`.
//! - [`SingleLineStat`]: files holding one numeric value, such as
//!   `memory.limit_in_bytes` or `memory.usage_in_bytes`.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use cgprocfs::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct MyStat {
//!     foo: u64,
//! }
//!
//! fn set_foo(stat: &mut MyStat, v: u64) {
//!     stat.foo = v;
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut MyStat, u64)>> = LazyLock::new(|| {
//!     let mut m: HashMap<&'static str, fn(&mut MyStat, u64)> = HashMap::new();
//!     m.insert("foo", set_foo);
//!     m
//! });
//!
//! impl KeyValueStat for MyStat {
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = MyStat::from_reader(&mut "foo 7\nbar 9\n".as_bytes()).unwrap();
//! assert_eq!(stat.foo, 7);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A trait for parsing `key value` style files such as `memory.stat`.
///
/// Implementors define the set of known keys and how each value is stored.
/// Unknown keys are ignored; a known key seen twice is an error.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// Map of known field names to the functions that store their values.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a buffered reader line by line into `Self`.
    ///
    /// Reading stops early once every known key has been seen.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading fails, or a [`StatParseError`] wrapped in an
    /// `io::Error` of kind `InvalidData` if a known key has a malformed or duplicate value.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut seen_keys = HashSet::with_capacity(handlers.len());

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                if let Some((k, handler)) = handlers.get_key_value(key) {
                    let parsed =
                        val.parse::<u64>()
                            .map_err(|source| StatParseError::InvalidKeyValue {
                                key: key.to_string(),
                                value: val.to_string(),
                                line: lineno,
                                source,
                            })?;
                    if !seen_keys.insert(*k) {
                        return Err(StatParseError::DuplicateField {
                            field: key.to_string(),
                            line: lineno,
                        }
                        .into());
                    }
                    handler(&mut stat, parsed);
                }
            }
            if seen_keys.len() == handlers.len() {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }
}

/// A trait for parsing single-line, single-value control files.
pub trait SingleLineStat: Sized {
    /// Parses the statistic from the provided buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading or parsing fails.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[derive(Debug, Default, PartialEq, Eq)]
    struct PairStat {
        first: u64,
        second: u64,
    }

    static PAIR_SETTERS: LazyLock<HashMap<&'static str, fn(&mut PairStat, u64)>> =
        LazyLock::new(|| {
            let mut m: HashMap<&'static str, fn(&mut PairStat, u64)> = HashMap::new();
            m.insert("first", |s, v| s.first = v);
            m.insert("second", |s, v| s.second = v);
            m
        });

    impl KeyValueStat for PairStat {
        fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
            &PAIR_SETTERS
        }
    }

    #[test]
    fn test_key_value_ignores_unknown_keys() {
        let stat = PairStat::from_reader(&mut "other 1\nsecond 2\nfirst 3\n".as_bytes()).unwrap();
        assert_eq!(
            stat,
            PairStat {
                first: 3,
                second: 2
            }
        );
    }

    #[test]
    fn test_key_value_duplicate_key() {
        let err = PairStat::from_reader(&mut "first 1\nfirst 2\nsecond 3\n".as_bytes()).unwrap_err();
        match extract_stat_parse_error(&err) {
            StatParseError::DuplicateField { field, line } => {
                assert_eq!(field, "first");
                assert_eq!(*line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
