//! Expansion of kernel list ranges such as `cpuset.cpus`.
//!
//! The kernel prints CPU and memory-node sets as a comma-separated list of
//! single ids and inclusive `a-b` ranges, e.g. `0-2,4`.

use std::num::ParseIntError;

/// A segment of a range list could not be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum MalformedRangeError {
    #[error("invalid number in range segment `{segment}`: {source}")]
    InvalidNumber {
        segment: String,
        #[source]
        source: ParseIntError,
    },
    #[error("range segment `{segment}` is descending ({start} > {end})")]
    Descending { segment: String, start: u32, end: u32 },
}

/// Expands a range list into the ids it names, in left-to-right order.
///
/// Ranges expand ascending. Duplicates are kept; an empty list yields no ids.
///
/// # Errors
///
/// - [`MalformedRangeError::InvalidNumber`] if a segment bound is not an unsigned integer.
/// - [`MalformedRangeError::Descending`] if a segment is `a-b` with `a > b`.
///
/// # Example
/// ```
/// # use cgprocfs::range::expand;
/// assert_eq!(expand("0-2,4").unwrap(), vec![0, 1, 2, 4]);
/// ```
pub fn expand(list: &str) -> Result<Vec<u32>, MalformedRangeError> {
    let list = list.trim();
    let mut ids = Vec::new();
    if list.is_empty() {
        return Ok(ids);
    }

    for segment in list.split(',') {
        match segment.split_once('-') {
            Some((start, end)) => {
                let start = parse_bound(segment, start)?;
                let end = parse_bound(segment, end)?;
                if start > end {
                    return Err(MalformedRangeError::Descending {
                        segment: segment.to_owned(),
                        start,
                        end,
                    });
                }
                ids.extend(start..=end);
            }
            None => ids.push(parse_bound(segment, segment)?),
        }
    }

    Ok(ids)
}

fn parse_bound(segment: &str, bound: &str) -> Result<u32, MalformedRangeError> {
    bound
        .trim()
        .parse::<u32>()
        .map_err(|source| MalformedRangeError::InvalidNumber {
            segment: segment.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_mixed_list() {
        assert_eq!(expand("0-2,4").unwrap(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_expand_preserves_segment_order() {
        assert_eq!(expand("6,2-3,0").unwrap(), vec![6, 2, 3, 0]);
    }

    #[test]
    fn test_expand_length_is_sum_of_segments() {
        let ids = expand("0-3,8-9,12,20-20").unwrap();
        assert_eq!(ids.len(), 4 + 2 + 1 + 1);
    }

    #[test]
    fn test_expand_keeps_duplicates() {
        assert_eq!(expand("1,0-1").unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_expand_trims_control_file_newline() {
        assert_eq!(expand("2,5-6\n").unwrap(), vec![2, 5, 6]);
    }

    #[test]
    fn test_expand_empty() {
        assert!(expand("").unwrap().is_empty());
        assert!(expand("\n").unwrap().is_empty());
    }

    #[test]
    fn test_expand_invalid_number() {
        let err = expand("0-2,x").unwrap_err();
        match err {
            MalformedRangeError::InvalidNumber { segment, .. } => assert_eq!(segment, "x"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            expand("1,,2").unwrap_err(),
            MalformedRangeError::InvalidNumber { .. }
        ));
        assert!(matches!(
            expand("-3").unwrap_err(),
            MalformedRangeError::InvalidNumber { .. }
        ));
    }

    #[test]
    fn test_expand_descending_range() {
        let err = expand("5-2").unwrap_err();
        match err {
            MalformedRangeError::Descending { start, end, .. } => {
                assert_eq!((start, end), (5, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
