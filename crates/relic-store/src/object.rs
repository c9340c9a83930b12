use std::sync::Arc;

use relic_types::{ObjectId, ObjectKind};

use crate::commit::Commit;
use crate::error::{StoreError, StoreResult};
use crate::repository::RepoShared;
use crate::tag::Tag;
use crate::tree::Tree;

/// A fully parsed object.
///
/// The kind set is closed, so a tagged enum carries the variants; callers
/// that need a generic object match on it or go through the typed
/// accessors. Variants are `Arc`-wrapped: clones are cheap and the same
/// parsed instance is shared between the sparse handles that reference it.
#[derive(Clone, Debug)]
pub enum Object {
    Blob(Arc<Blob>),
    Tree(Arc<Tree>),
    Commit(Arc<Commit>),
    Tag(Arc<Tag>),
}

impl Object {
    /// Parse a raw payload into the typed object for `kind`. `id` is the
    /// content address the payload was fetched under.
    pub(crate) fn parse(
        kind: ObjectKind,
        id: ObjectId,
        data: &[u8],
        repo: &Arc<RepoShared>,
    ) -> StoreResult<Self> {
        Ok(match kind {
            ObjectKind::Blob => Self::Blob(Arc::new(Blob::parse(id, data))),
            ObjectKind::Tree => Self::Tree(Arc::new(Tree::parse(id, data, repo)?)),
            ObjectKind::Commit => Self::Commit(Arc::new(Commit::parse(id, data, repo)?)),
            ObjectKind::Tag => Self::Tag(Arc::new(Tag::parse(id, data, repo)?)),
        })
    }

    /// Serialize back to the exact payload bytes the content address is
    /// computed over.
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        match self {
            Self::Blob(blob) => Ok(blob.data.clone()),
            Self::Tree(tree) => tree.serialize(),
            Self::Commit(commit) => commit.serialize(),
            Self::Tag(tag) => tag.serialize(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// The content address this object was parsed under, or null for
    /// objects built in memory and not yet written.
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Blob(blob) => blob.id,
            Self::Tree(tree) => tree.id,
            Self::Commit(commit) => commit.id,
            Self::Tag(tag) => tag.id,
        }
    }

    pub fn as_blob(&self) -> StoreResult<Arc<Blob>> {
        match self {
            Self::Blob(blob) => Ok(Arc::clone(blob)),
            other => Err(mismatch(ObjectKind::Blob, other)),
        }
    }

    pub fn as_tree(&self) -> StoreResult<Arc<Tree>> {
        match self {
            Self::Tree(tree) => Ok(Arc::clone(tree)),
            other => Err(mismatch(ObjectKind::Tree, other)),
        }
    }

    pub fn as_commit(&self) -> StoreResult<Arc<Commit>> {
        match self {
            Self::Commit(commit) => Ok(Arc::clone(commit)),
            other => Err(mismatch(ObjectKind::Commit, other)),
        }
    }

    pub fn as_tag(&self) -> StoreResult<Arc<Tag>> {
        match self {
            Self::Tag(tag) => Ok(Arc::clone(tag)),
            other => Err(mismatch(ObjectKind::Tag, other)),
        }
    }
}

fn mismatch(expected: ObjectKind, actual: &Object) -> StoreError {
    StoreError::TypeMismatch {
        expected,
        actual: actual.kind(),
    }
}

/// Content equality: two objects are equal when they serialize to the same
/// bytes, regardless of whether either has been written yet.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Blob(a), Self::Blob(b)) => a == b,
            (Self::Tree(a), Self::Tree(b)) => a == b,
            (Self::Commit(a), Self::Commit(b)) => a == b,
            (Self::Tag(a), Self::Tag(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Object {}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Self::Blob(Arc::new(blob))
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Self::Tree(Arc::new(tree))
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Self::Commit(Arc::new(commit))
    }
}

impl From<Tag> for Object {
    fn from(tag: Tag) -> Self {
        Self::Tag(Arc::new(tag))
    }
}

/// Raw content object. The payload is opaque; parse and serialize are the
/// identity.
#[derive(Clone, Debug)]
pub struct Blob {
    pub(crate) id: ObjectId,
    pub data: Vec<u8>,
}

impl Blob {
    /// A new, unwritten blob.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            id: ObjectId::null(),
            data,
        }
    }

    pub(crate) fn parse(id: ObjectId, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Blob {}

#[derive(Debug)]
pub(crate) enum KvError {
    PrefixMismatch,
    MissingNewline,
}

/// Scan one `<prefix><value>\n` line off the front of `data`, returning
/// the value and the remainder. Commit and tag parsing consume their
/// strictly ordered key-value sections with this.
pub(crate) fn read_kv<'a>(data: &'a [u8], prefix: &[u8]) -> Result<(&'a [u8], &'a [u8]), KvError> {
    if !data.starts_with(prefix) {
        return Err(KvError::PrefixMismatch);
    }
    let newline = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(KvError::MissingNewline)?;
    Ok((&data[prefix.len()..newline], &data[newline + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_parse_is_identity() {
        let blob = Blob::parse(ObjectId::null(), b"some bytes");
        assert_eq!(blob.data, b"some bytes");
        assert_eq!(blob.len(), 10);
    }

    #[test]
    fn blob_equality_ignores_id() {
        let written = Blob::parse(ObjectId::from_raw([1; 20]), b"same");
        let fresh = Blob::new(b"same".to_vec());
        assert_eq!(written, fresh);
    }

    #[test]
    fn object_kind_dispatch() {
        let object = Object::from(Blob::new(b"x".to_vec()));
        assert_eq!(object.kind(), ObjectKind::Blob);
        assert!(object.as_blob().is_ok());
        let err = object.as_tree().unwrap_err();
        assert!(matches!(
            err,
            StoreError::TypeMismatch {
                expected: ObjectKind::Tree,
                actual: ObjectKind::Blob,
            }
        ));
    }

    #[test]
    fn read_kv_splits_value_and_rest() {
        let (value, rest) = read_kv(b"tree abc\nnext", b"tree ").unwrap();
        assert_eq!(value, b"abc");
        assert_eq!(rest, b"next");
    }

    #[test]
    fn read_kv_prefix_mismatch() {
        assert!(matches!(
            read_kv(b"parent abc\n", b"tree "),
            Err(KvError::PrefixMismatch)
        ));
    }

    #[test]
    fn read_kv_missing_newline() {
        assert!(matches!(
            read_kv(b"tree abc", b"tree "),
            Err(KvError::MissingNewline)
        ));
    }
}
