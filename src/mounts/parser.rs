//! Mount table line parser for Linux systems.
//!
//! Parses lines in `/proc/mounts` (fstab) format. See
//! [`fstab(5)`](https://man7.org/linux/man-pages/man5/fstab.5.html)
//! for details on the structure.

use std::borrow::Cow;

/// Represents a parsed `/proc/mounts` line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Mounted device or pseudo filesystem name.
    pub source: &'a str,
    /// Mount point, with the kernel's octal escapes (`\040` etc.) decoded.
    pub mount_point: Cow<'a, str>,
    /// Filesystem type (e.g., `cgroup`, `proc`).
    pub fs_type: &'a str,
    /// Comma-separated mount options; for cgroup v1 these include the controllers.
    pub options: &'a str,
}

impl MountEntry<'_> {
    /// Iterates over the individual mount options.
    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.options.split(',').filter(|opt| !opt.is_empty())
    }
}

/// Named fields in a mount line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountField {
    Source,
    MountPoint,
    FsType,
    Options,
}

impl std::fmt::Display for MountField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountField::Source => "source",
            MountField::MountPoint => "mount_point",
            MountField::FsType => "fs_type",
            MountField::Options => "options",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mount line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing `{field}` in line: `{line}`")]
    MissingField { field: MountField, line: String },
}

/// Parses a single line of `/proc/mounts`.
///
/// The trailing dump and pass columns are optional and ignored.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] if one of the four leading fields is absent.
pub fn parse_mount_line(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let mut fields = line.split_whitespace();
    let mut next = |field: MountField| {
        fields.next().ok_or_else(|| ParseError::MissingField {
            field,
            line: line.trim_end().to_owned(),
        })
    };

    let source = next(MountField::Source)?;
    let mount_point = next(MountField::MountPoint)?;
    let fs_type = next(MountField::FsType)?;
    let options = next(MountField::Options)?;

    Ok(MountEntry {
        source,
        mount_point: unescape_octal(mount_point),
        fs_type,
        options,
    })
}

/// Decodes the `\ooo` escapes the kernel uses for space, tab, newline and backslash.
fn unescape_octal(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}
