use std::fmt;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;
use crate::kind::ObjectKind;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the SHA-1 digest of an object's type-prefixed serialized
/// form (`"<kind> <size>\0<payload>"`). Identical content always produces the
/// same `ObjectId`, making it both the identity and the storage key of an
/// object. The all-zero value is reserved as the "unset" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Create an `ObjectId` from a pre-computed 20-byte digest.
    pub const fn from_raw(raw: [u8; 20]) -> Self {
        Self(raw)
    }

    /// Compute the content address of an object: the SHA-1 of
    /// `"<kind> <decimal-size>\0"` followed by the payload bytes.
    pub fn hash_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(kind.name().as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// The null object ID (all zeros). Marks an object that has not been
    /// written yet.
    pub const fn null() -> Self {
        Self([0u8; 20])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex representation (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != 40 {
            return Err(TypeError::InvalidLength {
                expected: 40,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }

    /// Fill an `ObjectId` from the next 20 bytes of a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut raw = [0u8; 20];
        r.read_exact(&mut raw)?;
        Ok(Self(raw))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for ObjectId {
    fn from(raw: [u8; 20]) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for [u8; 20] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_object_is_deterministic() {
        let id1 = ObjectId::hash_object(ObjectKind::Blob, b"hello world");
        let id2 = ObjectId::hash_object(ObjectKind::Blob, b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let id1 = ObjectId::hash_object(ObjectKind::Blob, b"same bytes");
        let id2 = ObjectId::hash_object(ObjectKind::Tree, b"same bytes");
        assert_ne!(id1, id2);
    }

    #[test]
    fn empty_blob_has_well_known_id() {
        let id = ObjectId::hash_object(ObjectKind::Blob, b"");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn empty_tree_has_well_known_id() {
        let id = ObjectId::hash_object(ObjectKind::Tree, b"");
        assert_eq!(id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn hello_blob_has_well_known_id() {
        let id = ObjectId::hash_object(ObjectKind::Blob, b"hello\n");
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 20]);
        assert!(!ObjectId::from_raw([1u8; 20]).is_null());
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::hash_object(ObjectKind::Blob, b"test");
        let hex = id.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(hex, hex.to_lowercase());
        let parsed = ObjectId::from_hex(&hex).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 40,
                actual: 4
            }
        );
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let err = ObjectId::from_hex(&"zz".repeat(20)).unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn read_from_consumes_twenty_bytes() {
        let data = [7u8; 24];
        let mut cursor = std::io::Cursor::new(&data[..]);
        let id = ObjectId::read_from(&mut cursor).unwrap();
        assert_eq!(id.as_bytes(), &[7u8; 20]);
        assert_eq!(cursor.position(), 20);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let lo = ObjectId::from_raw([0; 20]);
        let mut raw = [0u8; 20];
        raw[19] = 1;
        let hi = ObjectId::from_raw(raw);
        assert!(lo < hi);
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::hash_object(ObjectKind::Blob, b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjectId::hash_object(ObjectKind::Blob, b"display");
        assert_eq!(format!("{id}"), id.to_hex());
        assert_eq!(id.short_hex().len(), 8);
    }
}
