use crate::cgroup::CgroupKey;

use super::EntryKind;

/// Misuse of the cache contract. Neither variant occurs in correct code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no `{kind}` entry cached for cgroup `{cgroup}`")]
    Miss { cgroup: CgroupKey, kind: EntryKind },
    #[error("cached `{kind}` entry for cgroup `{cgroup}` holds a {found} payload")]
    PayloadMismatch {
        cgroup: CgroupKey,
        kind: EntryKind,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
