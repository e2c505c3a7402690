use crate::engine;

/// Errors returned by [`super::VirtualFs`] operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory: `{path}`")]
    NotFound { path: String },
    #[error(transparent)]
    Engine(#[from] engine::Error),
}

impl FsError {
    /// The errno reported to the kernel for this failure.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::Engine(err) => err.errno(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
