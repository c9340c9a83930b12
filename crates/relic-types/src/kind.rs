use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of a stored object.
///
/// The set is closed: every object in the database is exactly one of these
/// four. The kind participates in content addressing via its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Directory listing: ordered entries mapping names to object ids.
    Tree,
    /// A snapshot with ancestry, author and committer information.
    Commit,
    /// An annotated tag pointing at another object.
    Tag,
}

impl ObjectKind {
    /// The on-disk type name, as it appears in loose object headers and tag
    /// `type` lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parse an on-disk type name.
    pub fn from_name(name: &str) -> Result<Self, TypeError> {
        match name {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn from_name_unknown() {
        let err = ObjectKind::from_name("branch").unwrap_err();
        assert_eq!(err, TypeError::UnknownKind("branch".to_string()));
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(format!("{}", ObjectKind::Commit), "commit");
    }
}
