//! Foundation types for the relic object database.
//!
//! This crate provides the identity and structural types shared by every
//! other relic crate.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (20-byte SHA-1)
//! - [`ObjectKind`] — The closed set of object kinds (blob, tree, commit, tag)
//! - [`EntryMode`] — Octal file mode carried by tree entries

pub mod error;
pub mod kind;
pub mod mode;
pub mod object;

pub use error::TypeError;
pub use kind::ObjectKind;
pub use mode::EntryMode;
pub use object::ObjectId;
