use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use tracing::debug;

use relic_types::{ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};

/// Per-object storage: each object lives in its own zlib-compressed file
/// at `objects/<hex[0..2]>/<hex[2..]>`, holding
/// `"<kind> <size>\0<payload>"`.
#[derive(Debug)]
pub struct LooseStore {
    root: PathBuf,
}

impl LooseStore {
    /// `root` is the object database root, i.e. the directory containing
    /// `objects/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    /// Whether a loose file exists for this id.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Read and decode one loose object.
    pub fn read(&self, id: &ObjectId) -> StoreResult<(ObjectKind, Vec<u8>)> {
        let corrupt = |reason: String| StoreError::CorruptLoose { id: *id, reason };

        let file = File::open(self.object_path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(*id)
            } else {
                StoreError::Io(e)
            }
        })?;
        let mut decoder = ZlibDecoder::new(BufReader::new(file));
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidInput
                || e.kind() == std::io::ErrorKind::InvalidData
                || e.kind() == std::io::ErrorKind::UnexpectedEof
            {
                corrupt(format!("zlib: {e}"))
            } else {
                StoreError::Io(e)
            }
        })?;

        let nul = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("missing NUL after header".into()))?;
        let header = std::str::from_utf8(&buf[..nul])
            .map_err(|_| corrupt("header is not UTF-8".into()))?;
        let (kind_name, size) = header
            .split_once(' ')
            .ok_or_else(|| corrupt("header missing space".into()))?;
        let kind = ObjectKind::from_name(kind_name).map_err(|e| corrupt(e.to_string()))?;
        let size: usize = size
            .parse()
            .map_err(|_| corrupt(format!("bad size {size:?}")))?;

        let payload = buf.split_off(nul + 1);
        if payload.len() != size {
            return Err(corrupt(format!(
                "payload is {} bytes, header says {size}",
                payload.len()
            )));
        }
        Ok((kind, payload))
    }

    /// Compress and store an object, returning its content address.
    ///
    /// The file is staged under `objects/` and renamed into place, so a
    /// crash never leaves a partial object and concurrent writers of the
    /// same content are safe. Writing an object that already exists is a
    /// no-op.
    pub fn write(&self, kind: ObjectKind, payload: &[u8]) -> StoreResult<ObjectId> {
        let id = ObjectId::hash_object(kind, payload);
        let path = self.object_path(&id);
        if path.is_file() {
            debug!(object = %id.short_hex(), "loose object already present");
            return Ok(id);
        }

        let objects_dir = self.root.join("objects");
        fs::create_dir_all(path.parent().unwrap_or(&objects_dir))?;

        let mut tmp = NamedTempFile::new_in(&objects_dir)?;
        let mut encoder = ZlibEncoder::new(&mut tmp, Compression::default());
        encoder.write_all(kind.name().as_bytes())?;
        encoder.write_all(b" ")?;
        encoder.write_all(payload.len().to_string().as_bytes())?;
        encoder.write_all(&[0u8])?;
        encoder.write_all(payload)?;
        encoder.finish()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(object = %id.short_hex(), kind = %kind, bytes = payload.len(), "wrote loose object");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LooseStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, store) = store();
        let id = store.write(ObjectKind::Blob, b"hello loose\n").unwrap();
        assert!(store.contains(&id));

        let (kind, payload) = store.read(&id).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(payload, b"hello loose\n");
    }

    #[test]
    fn write_uses_fanned_out_layout() {
        let (dir, store) = store();
        let id = store.write(ObjectKind::Blob, b"layout").unwrap();
        let hex = id.to_hex();
        let path = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        assert!(path.is_file());
    }

    #[test]
    fn empty_blob_gets_well_known_address() {
        let (_dir, store) = store();
        let id = store.write(ObjectKind::Blob, b"").unwrap();
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let (kind, payload) = store.read(&id).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert!(payload.is_empty());
    }

    #[test]
    fn write_is_idempotent() {
        let (dir, store) = store();
        let id1 = store.write(ObjectKind::Blob, b"twice").unwrap();
        let id2 = store.write(ObjectKind::Blob, b"twice").unwrap();
        assert_eq!(id1, id2);

        let (_, payload) = store.read(&id1).unwrap();
        assert_eq!(payload, b"twice");
        // Only the object file exists under its fan-out directory.
        let hex = id1.to_hex();
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("objects").join(&hex[..2]))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_dir, store) = store();
        let absent = ObjectId::from_raw([9; 20]);
        assert!(!store.contains(&absent));
        let err = store.read(&absent).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == absent));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let (dir, store) = store();
        let id = ObjectId::from_raw([0xab; 20]);
        let hex = id.to_hex();
        let parent = dir.path().join("objects").join(&hex[..2]);
        std::fs::create_dir_all(&parent).unwrap();
        std::fs::write(parent.join(&hex[2..]), b"not zlib at all").unwrap();

        let err = store.read(&id).unwrap_err();
        assert!(matches!(err, StoreError::CorruptLoose { .. }));
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let (dir, store) = store();
        let id = ObjectId::from_raw([0xcd; 20]);
        let hex = id.to_hex();
        let parent = dir.path().join("objects").join(&hex[..2]);
        std::fs::create_dir_all(&parent).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"blob 99\0short").unwrap();
        std::fs::write(parent.join(&hex[2..]), encoder.finish().unwrap()).unwrap();

        let err = store.read(&id).unwrap_err();
        match err {
            StoreError::CorruptLoose { reason, .. } => {
                assert!(reason.contains("header says 99"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_kind_is_corrupt() {
        let (dir, store) = store();
        let id = ObjectId::from_raw([0xef; 20]);
        let hex = id.to_hex();
        let parent = dir.path().join("objects").join(&hex[..2]);
        std::fs::create_dir_all(&parent).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"widget 1\0x").unwrap();
        std::fs::write(parent.join(&hex[2..]), encoder.finish().unwrap()).unwrap();

        assert!(matches!(
            store.read(&id).unwrap_err(),
            StoreError::CorruptLoose { .. }
        ));
    }
}
