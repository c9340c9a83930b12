use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use relic_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Object};
use crate::commit::Commit;
use crate::repository::RepoShared;
use crate::tag::Tag;
use crate::tree::Tree;

/// A lazy reference to an object: an id plus a backref to the repository
/// that can materialize it.
///
/// Trees reference children and commits reference parents through sparse
/// handles, so reading one commit never forces the whole graph into
/// memory. Handles are cheap to clone and share one resolution state:
/// `resolve` runs at most once per handle lifetime, and later calls replay
/// the cached object or the cached failure.
///
/// A handle whose id is the null sentinel denotes a new, unwritten object;
/// it is never resolved through the store.
#[derive(Clone)]
pub struct SparseObject {
    inner: Arc<SparseInner>,
}

struct SparseInner {
    id: Mutex<ObjectId>,
    repo: Weak<RepoShared>,
    cell: OnceLock<Result<Object, Arc<StoreError>>>,
}

impl SparseObject {
    pub(crate) fn new(id: ObjectId, repo: &Arc<RepoShared>) -> Self {
        Self {
            inner: Arc::new(SparseInner {
                id: Mutex::new(id),
                repo: Arc::downgrade(repo),
                cell: OnceLock::new(),
            }),
        }
    }

    /// Wrap an already materialized object, e.g. when assembling a tree in
    /// memory before writing it.
    pub fn from_object(object: Object) -> Self {
        let cell = OnceLock::new();
        let id = object.id();
        let _ = cell.set(Ok(object));
        Self {
            inner: Arc::new(SparseInner {
                id: Mutex::new(id),
                repo: Weak::new(),
                cell,
            }),
        }
    }

    /// The referenced object's id: the materialized object's id when one
    /// is present, otherwise the stored id.
    pub fn id(&self) -> ObjectId {
        if let Some(Ok(object)) = self.inner.cell.get() {
            let id = object.id();
            if !id.is_null() {
                return id;
            }
        }
        *self.inner.id.lock().expect("lock poisoned")
    }

    /// Whether a materialized object is available without touching the
    /// store.
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner.cell.get(), Some(Ok(_)))
    }

    /// The materialized object, if resolution already happened.
    pub fn cached(&self) -> Option<Object> {
        match self.inner.cell.get() {
            Some(Ok(object)) => Some(object.clone()),
            _ => None,
        }
    }

    /// Materialize the referenced object.
    ///
    /// The first call reads through the repository; the outcome, success
    /// or failure, is cached for the lifetime of the handle. A null-id
    /// handle fails with `NullObjectId` without touching the store (and
    /// without caching, so the handle works once an id is assigned).
    pub fn resolve(&self) -> StoreResult<Object> {
        if let Some(cached) = self.inner.cell.get() {
            return replay(cached, self.id());
        }
        let id = *self.inner.id.lock().expect("lock poisoned");
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let repo = self
            .inner
            .repo
            .upgrade()
            .ok_or(StoreError::RepositoryDropped)?;
        let result = self
            .inner
            .cell
            .get_or_init(|| RepoShared::object(&repo, id).map_err(Arc::new));
        replay(result, id)
    }

    /// Write the materialized object through the repository and record the
    /// resulting id. A no-op when nothing is materialized.
    pub fn write(&self) -> StoreResult<()> {
        let object = match self.inner.cell.get() {
            Some(Ok(object)) => object.clone(),
            _ => return Ok(()),
        };
        let repo = self
            .inner
            .repo
            .upgrade()
            .ok_or(StoreError::RepositoryDropped)?;
        let id = RepoShared::write(&repo, &object)?;
        *self.inner.id.lock().expect("lock poisoned") = id;
        Ok(())
    }

    /// Resolve and require a blob.
    pub fn blob(&self) -> StoreResult<Arc<Blob>> {
        self.resolve()?.as_blob()
    }

    /// Resolve and require a tree.
    pub fn tree(&self) -> StoreResult<Arc<Tree>> {
        self.resolve()?.as_tree()
    }

    /// Resolve and require a commit.
    pub fn commit(&self) -> StoreResult<Arc<Commit>> {
        self.resolve()?.as_commit()
    }

    /// Resolve and require a tag.
    pub fn tag(&self) -> StoreResult<Arc<Tag>> {
        self.resolve()?.as_tag()
    }
}

fn replay(result: &Result<Object, Arc<StoreError>>, id: ObjectId) -> StoreResult<Object> {
    match result {
        Ok(object) => Ok(object.clone()),
        Err(err) => Err(StoreError::Unresolvable {
            id,
            reason: err.to_string(),
        }),
    }
}

impl fmt::Debug for SparseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseObject")
            .field("id", &self.id())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
