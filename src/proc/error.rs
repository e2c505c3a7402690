use std::path::PathBuf;

use crate::cgroup;
use crate::fsutil::ReadError;

/// Errors that may occur while rendering a virtual file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Cgroup(#[from] cgroup::Error),
    #[error("cpu {cpu} is assigned to the cgroup but missing from host `{file}`")]
    InconsistentTopology { file: &'static str, cpu: u32 },
    #[error("malformed host data in `{path}` at line {line}: {reason}")]
    MalformedHostData {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl Error {
    /// Whether the failure comes from a host read that did not finish in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Read(err) => err.is_timeout(),
            Error::Cgroup(err) => err.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
