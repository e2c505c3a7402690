//! Where cgroup control values come from.
//!
//! [`FileSource`] reads control files below each controller's mount point.
//! [`CgmanagerSource`] asks a running cgmanager daemon over its D-Bus socket,
//! for hosts where the v1 hierarchies are only reachable through the manager.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::fsutil::HostFs;

use super::{CgroupKey, Error, Result};

/// Socket cgmanager listens on by default.
pub const CGMANAGER_SOCKET: &str = "/sys/fs/cgroup/cgmanager/sock";

const CGMANAGER_PATH: &str = "/org/linuxcontainers/cgmanager";
const CGMANAGER_INTERFACE: &str = "org.linuxcontainers.cgmanager0_0";

/// Provides the raw value of a cgroup control.
pub trait ControlSource: fmt::Debug + Send + Sync {
    /// Returns the untrimmed value of control `key` of `cgroup`.
    ///
    /// `mount` is the host mount path of the cgroup's controller. Sources
    /// that do not read the hierarchy directly ignore it.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be obtained, or if obtaining it
    /// did not finish in time.
    fn read_value(&self, mount: &Path, cgroup: &CgroupKey, key: &str) -> Result<String>;

    /// Whether values can only be read for controllers mounted on the host.
    fn needs_mounts(&self) -> bool {
        true
    }
}

/// Reads control files below the controller's mount point.
#[derive(Debug, Clone)]
pub struct FileSource {
    host: HostFs,
}

impl FileSource {
    pub fn new(host: HostFs) -> Self {
        Self { host }
    }
}

impl ControlSource for FileSource {
    fn read_value(&self, mount: &Path, cgroup: &CgroupKey, key: &str) -> Result<String> {
        let path = cgroup.dir(mount).join(key);
        self.host
            .read_to_string(&path)
            .map_err(|source| Error::ControlRead {
                cgroup: cgroup.clone(),
                key: key.to_owned(),
                source,
            })
    }
}

/// Reads control values through cgmanager's `GetValue` method.
///
/// cgmanager serves peer-to-peer D-Bus on a unix socket, so no bus daemon
/// sits in between. Calls are driven on the tokio runtime and abandoned once
/// `timeout` elapses, like host file reads.
#[derive(Debug, Clone)]
pub struct CgmanagerSource {
    connection: zbus::Connection,
    runtime: tokio::runtime::Handle,
    timeout: Duration,
}

impl CgmanagerSource {
    /// Connects to the cgmanager socket at `socket`.
    ///
    /// `timeout` bounds the handshake and every later call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerUnavailable`] if the socket cannot be reached,
    /// or the handshake fails or does not finish in time.
    pub fn connect(
        socket: &Path,
        runtime: tokio::runtime::Handle,
        timeout: Duration,
    ) -> Result<Self> {
        let unavailable = |reason: String| Error::ManagerUnavailable {
            socket: socket.to_path_buf(),
            reason,
        };

        let address = format!("unix:path={}", socket.display());
        let connect = async {
            zbus::connection::Builder::address(address.as_str())?
                .p2p()
                .build()
                .await
        };
        let connection = match runtime.block_on(tokio::time::timeout(timeout, connect)) {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => return Err(unavailable(err.to_string())),
            Err(_) => return Err(unavailable(format!("no answer within {timeout:?}"))),
        };

        log::debug!("connected to cgroup manager at `{}`", socket.display());
        Ok(Self {
            connection,
            runtime,
            timeout,
        })
    }
}

impl ControlSource for CgmanagerSource {
    fn read_value(&self, _mount: &Path, cgroup: &CgroupKey, key: &str) -> Result<String> {
        let call = async {
            let reply = self
                .connection
                .call_method(
                    None::<&str>,
                    CGMANAGER_PATH,
                    Some(CGMANAGER_INTERFACE),
                    "GetValue",
                    &(cgroup.controller(), cgroup.path(), key),
                )
                .await?;
            reply.body().deserialize::<String>()
        };

        let timeout = self.timeout;
        match self.runtime.block_on(tokio::time::timeout(timeout, call)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(Error::ManagerCall {
                cgroup: cgroup.clone(),
                key: key.to_owned(),
                source,
            }),
            Err(_) => {
                log::warn!(
                    "cgroup manager call for `{key}` of `{cgroup}` timed out after {timeout:?}"
                );
                Err(Error::ManagerTimeout {
                    cgroup: cgroup.clone(),
                    key: key.to_owned(),
                    timeout,
                })
            }
        }
    }

    fn needs_mounts(&self) -> bool {
        false
    }
}
