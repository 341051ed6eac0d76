use std::fmt;

/// Prefix of the Win32 device namespace.
pub const DEVICE_NAMESPACE: &str = r"\\.\";

const PHYSICAL_DRIVE: &str = "PhysicalDrive";

/// A path in the OS device namespace.
///
/// A `DevicePath` names either a logical volume (e.g. `\\.\E:`) or a physical
/// disk (e.g. `\\.\PhysicalDrive2`). It is opaque to the rest of the crate: the
/// only structure ever read back out of it is the physical drive index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePath(String);

impl DevicePath {
    /// Wraps an already-normalized device path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Normalizes a user-supplied volume identifier.
    ///
    /// Accepts a bare drive letter (`E`), a drive (`E:`), a drive root (`E:\`),
    /// or a path that already lives in the device namespace. Opening a volume
    /// requires the path without a trailing separator, so one is stripped.
    /// A blank identifier yields an empty path, which every open refuses.
    pub fn volume(id: &str) -> Self {
        let id = id.trim();
        let id = id.strip_suffix('\\').unwrap_or(id);
        if id.is_empty() {
            return Self(String::new());
        }

        if id.starts_with(DEVICE_NAMESPACE) || id.starts_with(r"\\?\") {
            return Self(id.to_string());
        }

        let mut chars = id.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(letter), None, None) if letter.is_ascii_alphabetic() => {
                Self(format!("{DEVICE_NAMESPACE}{}:", letter.to_ascii_uppercase()))
            }
            (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
                Self(format!("{DEVICE_NAMESPACE}{}:", letter.to_ascii_uppercase()))
            }
            _ => Self(format!("{DEVICE_NAMESPACE}{id}")),
        }
    }

    /// Builds the namespace path of physical disk `index`.
    pub fn physical_drive(index: u32) -> Self {
        Self(format!("{DEVICE_NAMESPACE}{PHYSICAL_DRIVE}{index}"))
    }

    /// Returns the disk index if this path names a physical drive.
    pub fn physical_index(&self) -> Option<u32> {
        let rest = self.0.strip_prefix(DEVICE_NAMESPACE)?;
        let prefix = rest.get(..PHYSICAL_DRIVE.len())?;
        if !prefix.eq_ignore_ascii_case(PHYSICAL_DRIVE) {
            return None;
        }
        rest[PHYSICAL_DRIVE.len()..].parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DevicePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
