use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Octal file mode carried by a tree entry.
///
/// The well-known values are exposed as constants, but the type keeps the
/// raw bits so that modes outside the canonical set (as found in the wild)
/// survive a parse/serialize round-trip byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryMode(u32);

impl EntryMode {
    /// Subtree / directory (`040000`).
    pub const DIRECTORY: EntryMode = EntryMode(0o040000);
    /// Regular file (`100644`).
    pub const REGULAR: EntryMode = EntryMode(0o100644);
    /// Executable file (`100755`).
    pub const EXECUTABLE: EntryMode = EntryMode(0o100755);
    /// Symbolic link (`120000`).
    pub const SYMLINK: EntryMode = EntryMode(0o120000);

    /// Build a mode from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw mode bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether this entry names a subtree. Drives canonical-name sorting:
    /// directories sort as if their name carried a trailing `/`.
    pub fn is_directory(&self) -> bool {
        self.0 & Self::DIRECTORY.0 != 0
    }

    /// Parse a mode from 1-6 octal digits, as stored in a serialized tree.
    pub fn parse_octal(digits: &[u8]) -> Result<Self, TypeError> {
        if digits.is_empty() || digits.len() > 6 {
            return Err(TypeError::InvalidMode(
                String::from_utf8_lossy(digits).into_owned(),
            ));
        }
        let mut bits = 0u32;
        for &b in digits {
            if !(b'0'..=b'7').contains(&b) {
                return Err(TypeError::InvalidMode(
                    String::from_utf8_lossy(digits).into_owned(),
                ));
            }
            bits = bits << 3 | u32::from(b - b'0');
        }
        Ok(Self(bits))
    }
}

/// Renders the mode as octal digits with no leading zeros, matching the
/// serialized tree format (`"40000"` for directories, not `"040000"`).
impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

impl fmt::Debug for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryMode({:o})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_regular_file() {
        let mode = EntryMode::parse_octal(b"100644").unwrap();
        assert_eq!(mode, EntryMode::REGULAR);
        assert_eq!(mode.bits(), 0o100644);
    }

    #[test]
    fn parse_rejects_non_octal() {
        assert!(matches!(
            EntryMode::parse_octal(b"8"),
            Err(TypeError::InvalidMode(_))
        ));
        assert!(matches!(
            EntryMode::parse_octal(b"10064x"),
            Err(TypeError::InvalidMode(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_and_oversized() {
        assert!(EntryMode::parse_octal(b"").is_err());
        assert!(EntryMode::parse_octal(b"1006440").is_err());
    }

    #[test]
    fn display_strips_leading_zeros() {
        assert_eq!(EntryMode::DIRECTORY.to_string(), "40000");
        assert_eq!(EntryMode::REGULAR.to_string(), "100644");
        assert_eq!(EntryMode::EXECUTABLE.to_string(), "100755");
        assert_eq!(EntryMode::SYMLINK.to_string(), "120000");
    }

    #[test]
    fn display_roundtrip() {
        for mode in [
            EntryMode::DIRECTORY,
            EntryMode::REGULAR,
            EntryMode::EXECUTABLE,
            EntryMode::SYMLINK,
        ] {
            let rendered = mode.to_string();
            assert_eq!(EntryMode::parse_octal(rendered.as_bytes()).unwrap(), mode);
        }
    }

    #[test]
    fn directory_detection() {
        assert!(EntryMode::DIRECTORY.is_directory());
        assert!(!EntryMode::REGULAR.is_directory());
        assert!(!EntryMode::EXECUTABLE.is_directory());
        assert!(!EntryMode::SYMLINK.is_directory());
    }
}
