use thiserror::Error;

use relic_pack::PackError;
use relic_types::{ObjectId, ObjectKind, TypeError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("corrupt loose object {id}: {reason}")]
    CorruptLoose { id: ObjectId, reason: String },

    #[error("malformed {kind} object: {reason}")]
    MalformedObject { kind: ObjectKind, reason: String },

    #[error("object {id} is unresolvable: {reason}")]
    Unresolvable { id: ObjectId, reason: String },

    #[error("null object id")]
    NullObjectId,

    #[error("tree entry {name:?} references an unwritten object")]
    UnwrittenChild { name: String },

    #[error("path not found in tree: {0}")]
    PathNotFound(String),

    #[error("invalid tree path: {0}")]
    InvalidPath(String),

    #[error("repository handle dropped while objects were still alive")]
    RepositoryDropped,

    #[error("found {0} pack files, expected at most one")]
    MultiplePacks(usize),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
