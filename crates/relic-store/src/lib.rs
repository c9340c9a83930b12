//! Content-addressed object storage for the relic object database.
//!
//! This crate implements the typed half of the store: the byte-exact
//! codecs for the four object kinds, loose object files, lazy references,
//! and the [`Repository`] facade that dispatches reads between the pack
//! and loose stores.
//!
//! # Object Types
//!
//! - [`Blob`] — raw content (file contents, arbitrary data)
//! - [`Tree`] — directory listing mapping names to object references
//! - [`Commit`] — tree snapshot plus ancestry and identity lines
//! - [`Tag`] — annotated, named pointer at another object
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; content addressing guarantees
//!    the same bytes always land at the same id.
//! 2. Serialization is byte-exact: `parse` then `serialize` reproduces the
//!    input, and the SHA-1 of the type-prefixed payload is the identity.
//! 3. Object graphs materialize lazily: trees and commits hold
//!    [`SparseObject`] handles, not children.
//! 4. Reads prefer the pack; writes always go to loose storage via a
//!    temp-file rename.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod builder;
pub mod commit;
pub mod error;
pub mod loose;
pub mod object;
pub mod repository;
pub mod signature;
pub mod sparse;
pub mod tag;
pub mod tree;

pub use builder::TreeBuilder;
pub use commit::Commit;
pub use error::{StoreError, StoreResult};
pub use loose::LooseStore;
pub use object::{Blob, Object};
pub use repository::Repository;
pub use signature::Signature;
pub use sparse::SparseObject;
pub use tag::Tag;
pub use tree::{Tree, TreeEntry};
