use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Error that occurs when reading a host file fails or does not finish in time.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading file `{path}` did not finish within {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },
}

impl ReadError {
    /// The host path the failed read was aimed at.
    pub fn path(&self) -> &Path {
        match self {
            ReadError::Io { path, .. } | ReadError::Timeout { path, .. } => path,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadError::Timeout { .. })
    }
}

/// Read access to the host's files below a root filesystem prefix.
///
/// Paths handed to [`HostFs`] are absolute host paths (`/proc/meminfo`,
/// `/sys/fs/cgroup/memory/lxc/c1/memory.stat`); they are resolved below
/// `rootfs`, which is `/` on the host and the host bind mount when running in
/// a container. Every read runs on the tokio blocking pool and is abandoned
/// once `timeout` elapses, so a hung cgroup file cannot stall the caller.
#[derive(Debug, Clone)]
pub struct HostFs {
    rootfs: PathBuf,
    runtime: tokio::runtime::Handle,
    timeout: Duration,
}

impl HostFs {
    pub fn new(
        rootfs: impl Into<PathBuf>,
        runtime: tokio::runtime::Handle,
        timeout: Duration,
    ) -> Self {
        Self {
            rootfs: rootfs.into(),
            runtime,
            timeout,
        }
    }

    /// Maps an absolute host path onto the root filesystem prefix.
    ///
    /// # Example
    /// ```
    /// # use cgprocfs::fsutil::HostFs;
    /// # let rt = tokio::runtime::Builder::new_multi_thread().build().unwrap();
    /// let host = HostFs::new("/rootfs", rt.handle().clone(), std::time::Duration::from_secs(1));
    /// assert_eq!(host.resolve("/proc/stat"), std::path::PathBuf::from("/rootfs/proc/stat"));
    /// ```
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(relative) => self.rootfs.join(relative),
            Err(_) => self.rootfs.join(path),
        }
    }

    /// Reads a whole host file into a string.
    ///
    /// # Errors
    ///
    /// - [`ReadError::Io`] if the file cannot be opened or read.
    /// - [`ReadError::Timeout`] if the read did not complete within the configured timeout.
    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, ReadError> {
        let path = self.resolve(path);
        let read = tokio::fs::read_to_string(path.clone());
        self.bounded(path, read)
    }

    /// Returns the inode change time of a host path.
    ///
    /// # Errors
    ///
    /// Same as [`HostFs::read_to_string`].
    pub fn changed_at(&self, path: impl AsRef<Path>) -> Result<SystemTime, ReadError> {
        let path = self.resolve(path);
        let metadata = self.bounded(path.clone(), tokio::fs::metadata(path.clone()))?;
        let secs = u64::try_from(metadata.ctime()).unwrap_or(0);
        let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }

    fn bounded<T>(
        &self,
        path: PathBuf,
        op: impl Future<Output = io::Result<T>>,
    ) -> Result<T, ReadError> {
        let timeout = self.timeout;
        match self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, op).await })
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ReadError::Io { path, source }),
            Err(_) => {
                log::warn!("read of `{}` timed out after {:?}", path.display(), timeout);
                Err(ReadError::Timeout { path, timeout })
            }
        }
    }
}
