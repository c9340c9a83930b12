//! Pack file access for the relic object database.
//!
//! A pack aggregates many objects into one file, some stored whole and
//! some as copy/insert deltas against another entry. This crate reads the
//! on-disk pair consumed by the store:
//!
//! - **Pack file** (`.pack`): `"PACK"` header, entries with
//!   size-and-type varint headers and zlib-compressed bodies, SHA-1
//!   trailer
//! - **Pack index** (`.idx`, v2): fan-out table + sorted ids for
//!   O(log n) offset lookups, verified by its trailing digest
//! - **[`Pack`]**: random-access reads with recursive delta resolution
//!   and a shared, size-weighted payload cache
//!
//! Pack creation is out of scope; existing packs are read, never written.

pub mod delta;
pub mod entry;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod index;
pub mod pack;
pub mod reader;

pub use delta::apply_delta;
pub use entry::{EntryKind, PackEntry};
pub use error::{PackError, PackResult};
pub use index::PackIndex;
pub use pack::{EntryCache, Pack, DEFAULT_CACHE_CAPACITY};
pub use reader::PackReader;
