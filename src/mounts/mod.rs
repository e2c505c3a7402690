//! Discovery of cgroup v1 controller mount points from `/proc/mounts`.
mod error;
mod parser;
mod table;

pub use error::{Error, Result};
pub use parser::{MountEntry, MountField, ParseError, parse_mount_line};
pub use table::{ControllerTable, KNOWN_CONTROLLERS, controller_table};
