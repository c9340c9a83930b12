use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use relic_cache::WeightedLru;
use relic_pack::{EntryCache, Pack, PackError, DEFAULT_CACHE_CAPACITY};
use relic_types::{EntryMode, ObjectId, ObjectKind};

use crate::builder::TreeBuilder;
use crate::commit::Commit;
use crate::error::{StoreError, StoreResult};
use crate::loose::LooseStore;
use crate::object::{Blob, Object};
use crate::sparse::SparseObject;
use crate::tag::Tag;
use crate::tree::{validate_name, Tree, TreeEntry};

/// Weighted capacity of the tree-entry interning cache.
const TREE_ENTRY_CACHE_CAPACITY: u64 = 1 << 16;

/// Fixed weight charged per interned tree entry on top of its row bytes.
const TREE_ENTRY_OVERHEAD: u64 = 48;

/// The object database: a single optional pack plus loose storage.
///
/// Reads try the pack first and fall back to loose files; writes always go
/// to loose storage (packing is an offline concern). The handle is cheap
/// to clone and safe to share between threads.
#[derive(Clone)]
pub struct Repository {
    shared: Arc<RepoShared>,
}

pub(crate) struct RepoShared {
    root: PathBuf,
    loose: LooseStore,
    pack: Option<Pack>,
    /// Set on the first corrupt-pack error; the pack is then skipped for
    /// the rest of the process lifetime.
    pack_disabled: AtomicBool,
    /// Interns parsed tree rows by their raw serialized bytes, so the same
    /// entry appearing in many trees is parsed and allocated once.
    tree_entries: WeightedLru<Vec<u8>, Arc<TreeEntry>>,
}

impl Repository {
    /// Open the object database rooted at `root` (the directory holding
    /// `objects/`). Discovery of that directory is the caller's concern.
    ///
    /// At most one pack is supported; it is opened and verified here.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let pack = open_single_pack(&root)?;
        debug!(root = %root.display(), pack = pack.is_some(), "opened repository");
        Ok(Self {
            shared: Arc::new(RepoShared {
                loose: LooseStore::new(&root),
                root,
                pack,
                pack_disabled: AtomicBool::new(false),
                tree_entries: WeightedLru::new(TREE_ENTRY_CACHE_CAPACITY),
            }),
        })
    }

    /// The object database root.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Read and parse an object by id. The pack is consulted first; a pack
    /// miss falls through to loose storage; `NotFound` means neither store
    /// knows the id.
    pub fn object(&self, id: ObjectId) -> StoreResult<Object> {
        RepoShared::object(&self.shared, id)
    }

    /// A lazy handle for an object that may or may not exist yet.
    pub fn sparse(&self, id: ObjectId) -> SparseObject {
        SparseObject::new(id, &self.shared)
    }

    /// `object` + blob requirement.
    pub fn blob(&self, id: ObjectId) -> StoreResult<Arc<Blob>> {
        self.object(id)?.as_blob()
    }

    /// `object` + tree requirement.
    pub fn tree(&self, id: ObjectId) -> StoreResult<Arc<Tree>> {
        self.object(id)?.as_tree()
    }

    /// `object` + commit requirement.
    pub fn commit(&self, id: ObjectId) -> StoreResult<Arc<Commit>> {
        self.object(id)?.as_commit()
    }

    /// `object` + tag requirement.
    pub fn tag(&self, id: ObjectId) -> StoreResult<Arc<Tag>> {
        self.object(id)?.as_tag()
    }

    /// Ensure a sparse handle is materialized. A no-op when it already is,
    /// or when its id is the null sentinel (a new object with nothing to
    /// load).
    pub fn resolve(&self, sparse: &SparseObject) -> StoreResult<()> {
        if sparse.is_resolved() || sparse.id().is_null() {
            return Ok(());
        }
        sparse.resolve().map(drop)
    }

    /// Whether either store holds this object.
    pub fn contains(&self, id: ObjectId) -> bool {
        let in_pack = self
            .shared
            .pack
            .as_ref()
            .is_some_and(|pack| !self.shared.pack_disabled.load(Ordering::Relaxed) && pack.contains(&id));
        in_pack || self.shared.loose.contains(&id)
    }

    /// Serialize an object and store it loose, returning its content
    /// address. Trees must have all child ids populated (write children
    /// first, or use [`write_tree`](Self::write_tree)). Idempotent.
    pub fn write(&self, object: &Object) -> StoreResult<ObjectId> {
        RepoShared::write(&self.shared, object)
    }

    /// Write a tree under construction: dirty subtrees are written
    /// bottom-up, empty subtrees are elided from their parents, and an
    /// empty root still produces the (legitimate) empty tree object.
    pub fn write_tree(&self, builder: &mut TreeBuilder) -> StoreResult<ObjectId> {
        match builder.write_into(self)? {
            Some(id) => Ok(id),
            None => self.shared.loose.write(ObjectKind::Tree, &[]),
        }
    }

    pub(crate) fn write_tree_payload(&self, payload: &[u8]) -> StoreResult<ObjectId> {
        self.shared.loose.write(ObjectKind::Tree, payload)
    }

    pub(crate) fn shared(&self) -> &Arc<RepoShared> {
        &self.shared
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.shared.root)
            .field("pack", &self.shared.pack.is_some())
            .finish()
    }
}

impl RepoShared {
    pub(crate) fn object(shared: &Arc<Self>, id: ObjectId) -> StoreResult<Object> {
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        if let Some(pack) = &shared.pack {
            if !shared.pack_disabled.load(Ordering::Relaxed) {
                match pack.object_for(&id) {
                    Ok((kind, payload)) => return Object::parse(kind, id, &payload, shared),
                    Err(PackError::NotFound(_)) => {}
                    Err(err) => {
                        if err.is_corrupt() {
                            shared.pack_disabled.store(true, Ordering::Relaxed);
                            warn!(
                                pack = %pack.id().short_hex(),
                                error = %err,
                                "disabling corrupt pack"
                            );
                        }
                        return Err(err.into());
                    }
                }
            }
        }
        let (kind, payload) = shared.loose.read(&id)?;
        Object::parse(kind, id, &payload, shared)
    }

    pub(crate) fn write(shared: &Arc<Self>, object: &Object) -> StoreResult<ObjectId> {
        let payload = object.serialize()?;
        shared.loose.write(object.kind(), &payload)
    }

    /// Look up or build the interned entry for one serialized tree row
    /// (`row` spans mode through the 20-byte id; `space` and `nul` are the
    /// separator positions within it).
    pub(crate) fn intern_entry(
        shared: &Arc<Self>,
        row: &[u8],
        space: usize,
        nul: usize,
    ) -> StoreResult<Arc<TreeEntry>> {
        let malformed = |reason: String| StoreError::MalformedObject {
            kind: ObjectKind::Tree,
            reason,
        };

        if let Some(entry) = shared.tree_entries.get(&row.to_vec()) {
            return Ok(entry);
        }

        let mode = EntryMode::parse_octal(&row[..space]).map_err(|e| malformed(e.to_string()))?;
        let name = std::str::from_utf8(&row[space + 1..nul])
            .map_err(|_| malformed("entry name is not UTF-8".into()))?;
        validate_name(name).map_err(|_| malformed(format!("invalid entry name {name:?}")))?;
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&row[nul + 1..nul + 21]);

        let entry = Arc::new(TreeEntry::new_unchecked(
            mode,
            name.to_string(),
            SparseObject::new(ObjectId::from_raw(raw), shared),
        ));
        shared.tree_entries.put(
            row.to_vec(),
            Arc::clone(&entry),
            row.len() as u64 + TREE_ENTRY_OVERHEAD,
        );
        Ok(entry)
    }
}

/// Find the repository's pack pair under `objects/pack/`. Zero packs is a
/// loose-only database; more than one is unsupported.
fn open_single_pack(root: &Path) -> StoreResult<Option<Pack>> {
    let pack_dir = root.join("objects").join("pack");
    if !pack_dir.is_dir() {
        return Ok(None);
    }
    let mut indexes: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(&pack_dir)? {
        let path = entry?.path();
        let is_index = path.extension().is_some_and(|ext| ext == "idx")
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("pack-"));
        if is_index {
            indexes.push(path);
        }
    }
    match indexes.len() {
        0 => Ok(None),
        1 => {
            let cache = Arc::new(EntryCache::new(DEFAULT_CACHE_CAPACITY));
            Ok(Some(Pack::open_with_cache(&indexes[0], cache)?))
        }
        n => Err(StoreError::MultiplePacks(n)),
    }
}
