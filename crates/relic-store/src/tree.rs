use std::borrow::Cow;
use std::sync::Arc;

use relic_types::{EntryMode, ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Object};
use crate::repository::RepoShared;
use crate::sparse::SparseObject;

/// One row of a tree: `<octal-mode> <name>\0<20-byte id>`.
///
/// Entries parsed from the store are interned by their raw serialized
/// bytes, so identical rows across many trees share one allocation and one
/// resolution state.
#[derive(Debug)]
pub struct TreeEntry {
    mode: EntryMode,
    name: String,
    target: SparseObject,
}

impl TreeEntry {
    /// Build an entry for in-memory tree assembly. The name must be
    /// non-empty and contain neither `/` nor NUL.
    pub fn new(mode: EntryMode, name: impl Into<String>, target: SparseObject) -> StoreResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { mode, name, target })
    }

    pub(crate) fn new_unchecked(mode: EntryMode, name: String, target: SparseObject) -> Self {
        Self { mode, name, target }
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The referenced object, lazily resolvable.
    pub fn target(&self) -> &SparseObject {
        &self.target
    }

    /// The name used for sort order: directories sort as if suffixed with
    /// `/`.
    pub(crate) fn canonical_name(&self) -> Cow<'_, str> {
        canonical_key(&self.name, self.mode.is_directory())
    }

    /// Whether this entry points at a materialized tree with no entries.
    /// Such entries are dropped from their parent's serialized form.
    fn is_empty_subtree(&self) -> bool {
        if !self.mode.is_directory() {
            return false;
        }
        matches!(self.target.cached(), Some(Object::Tree(tree)) if tree.is_empty())
    }
}

impl PartialEq for TreeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.name == other.name && self.target.id() == other.target.id()
    }
}

impl Eq for TreeEntry {}

pub(crate) fn canonical_key(name: &str, is_directory: bool) -> Cow<'_, str> {
    if is_directory {
        Cow::Owned(format!("{name}/"))
    } else {
        Cow::Borrowed(name)
    }
}

pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(StoreError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Append one serialized row: mode in octal with no leading zeros, a
/// space, the name, NUL, then the raw 20-byte id.
pub(crate) fn write_row(buf: &mut Vec<u8>, mode: EntryMode, name: &str, id: &ObjectId) {
    buf.extend_from_slice(mode.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(id.as_bytes());
}

/// Directory listing object: an ordered list of named references to blobs
/// and subtrees.
#[derive(Debug)]
pub struct Tree {
    pub(crate) id: ObjectId,
    entries: Vec<Arc<TreeEntry>>,
}

impl Tree {
    /// A new, unwritten tree with the given entries.
    pub fn new(entries: Vec<Arc<TreeEntry>>) -> Self {
        Self {
            id: ObjectId::null(),
            entries,
        }
    }

    /// An empty tree.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn parse(id: ObjectId, data: &[u8], repo: &Arc<RepoShared>) -> StoreResult<Self> {
        let malformed = |reason: &str| StoreError::MalformedObject {
            kind: ObjectKind::Tree,
            reason: reason.to_string(),
        };

        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| malformed("entry missing space after mode"))?;
            let nul = rest[space + 1..]
                .iter()
                .position(|&b| b == 0)
                .map(|pos| space + 1 + pos)
                .ok_or_else(|| malformed("entry missing NUL after name"))?;
            let row_len = nul + 1 + 20;
            if rest.len() < row_len {
                return Err(malformed("entry truncated before 20-byte id"));
            }
            entries.push(RepoShared::intern_entry(repo, &rest[..row_len], space, nul)?);
            rest = &rest[row_len..];
        }
        Ok(Self { id, entries })
    }

    /// Serialize in canonical order, skipping entries that point at
    /// materialized empty subtrees. Fails if any remaining entry's target
    /// has no id yet.
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        let mut ordered: Vec<&Arc<TreeEntry>> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_empty_subtree())
            .collect();
        ordered.sort_by(|a, b| a.canonical_name().cmp(&b.canonical_name()));

        let mut buf = Vec::new();
        for entry in ordered {
            let id = entry.target.id();
            if id.is_null() {
                return Err(StoreError::UnwrittenChild {
                    name: entry.name.clone(),
                });
            }
            write_row(&mut buf, entry.mode, &entry.name, &id);
        }
        Ok(buf)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn entries(&self) -> &[Arc<TreeEntry>] {
        &self.entries
    }

    /// Look up a direct child by name.
    pub fn get(&self, name: &str) -> Option<&Arc<TreeEntry>> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk a `/`-separated path, resolving intermediate subtrees on
    /// demand, and return the handle for the final component.
    pub fn find(&self, path: &str) -> StoreResult<SparseObject> {
        let trimmed = path.trim_start_matches('/');
        let components: Vec<&str> = trimmed.split('/').collect();
        if trimmed.is_empty() || components.iter().any(|c| c.is_empty()) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.find_components(&components, path)
    }

    fn find_components(&self, components: &[&str], full: &str) -> StoreResult<SparseObject> {
        let (head, rest) = components
            .split_first()
            .ok_or_else(|| StoreError::InvalidPath(full.to_string()))?;
        for entry in &self.entries {
            if entry.name == *head {
                if rest.is_empty() {
                    return Ok(entry.target.clone());
                }
                if let Object::Tree(subtree) = entry.target.resolve()? {
                    return subtree.find_components(rest, full);
                }
                break;
            }
        }
        Err(StoreError::PathNotFound(full.to_string()))
    }

    /// `find` followed by a blob requirement.
    pub fn find_blob(&self, path: &str) -> StoreResult<Arc<Blob>> {
        self.find(path)?.blob()
    }

    /// `find` followed by a tree requirement.
    pub fn find_tree(&self, path: &str) -> StoreResult<Arc<Tree>> {
        self.find(path)?.tree()
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a == b)
    }
}

impl Eq for Tree {}
