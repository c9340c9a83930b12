use std::collections::BTreeMap;

use relic_types::{EntryMode, ObjectId};

use crate::error::{StoreError, StoreResult};
use crate::repository::Repository;
use crate::tree::{canonical_key, validate_name, write_row, Tree};

/// Mutable tree under construction.
///
/// A builder is a nested map of names to either written objects (leaves)
/// or child builders. Inserting or removing a path marks every builder on
/// that path dirty; writing walks depth-first and re-serializes only dirty
/// subtrees, so editing one file in a deep tree rewrites one spine of
/// tree objects. Builders are not meant to be shared between threads while
/// being mutated.
#[derive(Debug)]
pub struct TreeBuilder {
    entries: BTreeMap<String, Node>,
    /// Id of the written form of this subtree, valid while clean.
    base: Option<ObjectId>,
    dirty: bool,
}

#[derive(Debug)]
enum Node {
    /// A written object: a blob, or a subtree this builder never descended
    /// into.
    Leaf { mode: EntryMode, id: ObjectId },
    /// A subtree opened for editing.
    Subtree(TreeBuilder),
}

impl TreeBuilder {
    /// An empty builder for a brand-new tree.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            base: None,
            dirty: true,
        }
    }

    /// Open an existing tree for editing. Children stay as leaves until a
    /// path edit descends into them.
    pub fn from_tree(tree: &Tree) -> StoreResult<Self> {
        let mut entries = BTreeMap::new();
        for entry in tree.entries() {
            let id = entry.target().id();
            if id.is_null() {
                return Err(StoreError::UnwrittenChild {
                    name: entry.name().to_string(),
                });
            }
            entries.insert(
                entry.name().to_string(),
                Node::Leaf {
                    mode: entry.mode(),
                    id,
                },
            );
        }
        let base = (!tree.id().is_null()).then(|| tree.id());
        Ok(Self {
            entries,
            dirty: base.is_none(),
            base,
        })
    }

    /// Set the object at `path` (e.g. `"src/lib.rs"`), creating
    /// intermediate subtrees as needed. Descending through an existing
    /// subtree loads it through the repository; descending through a
    /// non-directory entry is an error.
    pub fn insert(
        &mut self,
        repo: &Repository,
        path: &str,
        id: ObjectId,
        mode: EntryMode,
    ) -> StoreResult<()> {
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let components = split_path(path)?;
        self.insert_at(repo, &components, path, id, mode)
    }

    fn insert_at(
        &mut self,
        repo: &Repository,
        components: &[&str],
        full: &str,
        id: ObjectId,
        mode: EntryMode,
    ) -> StoreResult<()> {
        let (head, rest) = components
            .split_first()
            .ok_or_else(|| StoreError::InvalidPath(full.to_string()))?;
        if rest.is_empty() {
            self.entries.insert(head.to_string(), Node::Leaf { mode, id });
            self.dirty = true;
            return Ok(());
        }

        let opened = match self.entries.get(*head) {
            None => Some(TreeBuilder::new()),
            Some(Node::Leaf { mode, id }) if mode.is_directory() => {
                Some(TreeBuilder::from_tree(&*repo.tree(*id)?)?)
            }
            Some(Node::Leaf { .. }) => {
                return Err(StoreError::InvalidPath(full.to_string()));
            }
            Some(Node::Subtree(_)) => None,
        };
        if let Some(builder) = opened {
            self.entries.insert(head.to_string(), Node::Subtree(builder));
        }
        match self.entries.get_mut(*head) {
            Some(Node::Subtree(child)) => {
                child.insert_at(repo, rest, full, id, mode)?;
                self.dirty = true;
                Ok(())
            }
            _ => Err(StoreError::InvalidPath(full.to_string())),
        }
    }

    /// Remove the entry at `path`. Returns whether anything was removed;
    /// builders on the path are only marked dirty when something was.
    pub fn remove(&mut self, repo: &Repository, path: &str) -> StoreResult<bool> {
        let components = split_path(path)?;
        self.remove_at(repo, &components, path)
    }

    fn remove_at(&mut self, repo: &Repository, components: &[&str], full: &str) -> StoreResult<bool> {
        let (head, rest) = components
            .split_first()
            .ok_or_else(|| StoreError::InvalidPath(full.to_string()))?;
        if rest.is_empty() {
            let removed = self.entries.remove(*head).is_some();
            self.dirty |= removed;
            return Ok(removed);
        }

        let opened = match self.entries.get(*head) {
            Some(Node::Leaf { mode, id }) if mode.is_directory() => {
                Some(TreeBuilder::from_tree(&*repo.tree(*id)?)?)
            }
            Some(Node::Subtree(_)) => None,
            _ => return Ok(false),
        };
        if let Some(builder) = opened {
            self.entries.insert(head.to_string(), Node::Subtree(builder));
        }
        match self.entries.get_mut(*head) {
            Some(Node::Subtree(child)) => {
                let removed = child.remove_at(repo, rest, full)?;
                self.dirty |= removed;
                Ok(removed)
            }
            _ => Ok(false),
        }
    }

    /// Whether this builder (or any descendant) has unwritten edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write dirty subtrees bottom-up. Returns `None` for an empty
    /// subtree, which the parent elides from its serialized form; the
    /// repository's `write_tree` turns a `None` root into a legitimate
    /// empty tree object.
    pub(crate) fn write_into(&mut self, repo: &Repository) -> StoreResult<Option<ObjectId>> {
        if !self.dirty {
            if let Some(base) = self.base {
                return Ok(Some(base));
            }
        }

        let mut rows: Vec<(String, EntryMode, ObjectId)> = Vec::new();
        for (name, node) in &mut self.entries {
            validate_name(name)?;
            match node {
                Node::Leaf { mode, id } => rows.push((name.clone(), *mode, *id)),
                Node::Subtree(child) => {
                    if let Some(id) = child.write_into(repo)? {
                        rows.push((name.clone(), EntryMode::DIRECTORY, id));
                    }
                }
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }

        rows.sort_by(|a, b| {
            canonical_key(&a.0, a.1.is_directory()).cmp(&canonical_key(&b.0, b.1.is_directory()))
        });
        let mut payload = Vec::new();
        for (name, mode, id) in &rows {
            write_row(&mut payload, *mode, name, id);
        }

        let id = repo.write_tree_payload(&payload)?;
        self.base = Some(id);
        self.dirty = false;
        Ok(Some(id))
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn split_path(path: &str) -> StoreResult<Vec<&str>> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let components: Vec<&str> = trimmed.split('/').collect();
    for component in &components {
        if component.is_empty() || component.contains('\0') {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(components)
}
