use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use relic_cache::WeightedLru;
use relic_types::{ObjectId, ObjectKind};

use crate::delta::apply_delta;
use crate::entry::{read_base_distance, read_entry_header, EntryHeader, EntryKind, PackEntry};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::reader::PackReader;

/// Magic bytes opening a pack file.
pub const PACK_MAGIC: [u8; 4] = *b"PACK";

/// Shared cache of materialized pack entries, keyed by
/// `(pack checksum, entry offset)` so multiple packs may share one cache.
pub type EntryCache = WeightedLru<(ObjectId, u64), Arc<PackEntry>>;

/// Weighted capacity of the default payload cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 16 * 1024 * 1024;

/// What the reader produced for one entry before delta resolution.
enum RawEntry {
    Base {
        kind: ObjectKind,
        header_len: usize,
        size: u64,
    },
    OfsDelta {
        header_len: usize,
        distance: u64,
        delta: Vec<u8>,
    },
    RefDelta {
        header_len: usize,
        base: ObjectId,
        delta: Vec<u8>,
    },
}

/// A single pack file plus its index.
///
/// Reads are safe from multiple threads: the file cursor is the one shared
/// mutable resource and is serialized behind a mutex for the duration of
/// each read (including its zlib session); the payload cache absorbs the
/// resulting contention.
pub struct Pack {
    version: u32,
    total: u32,
    id: ObjectId,
    index: PackIndex,
    reader: Mutex<PackReader>,
    cache: Arc<EntryCache>,
}

impl Pack {
    /// Open `pack-<hex>.pack`/`.idx` with a private payload cache of the
    /// default capacity. `path` may point at either file of the pair.
    pub fn open(path: &Path) -> PackResult<Self> {
        Self::open_with_cache(path, Arc::new(EntryCache::new(DEFAULT_CACHE_CAPACITY)))
    }

    /// Open a pack sharing an existing payload cache.
    pub fn open_with_cache(path: &Path, cache: Arc<EntryCache>) -> PackResult<Self> {
        let index = PackIndex::open(&path.with_extension("idx"))?;
        let mut reader = PackReader::open(&path.with_extension("pack"))?;
        let (version, total) = verify(&mut reader, &index)?;
        let id = index.pack_checksum();
        debug!(
            pack = %id.short_hex(),
            objects = index.object_count(),
            "opened pack"
        );
        Ok(Self {
            version,
            total,
            id,
            index,
            reader: Mutex::new(reader),
            cache,
        })
    }

    /// The pack's identity: its trailing content checksum.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Pack format version (always 2).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Entry count from the pack header.
    pub fn object_count(&self) -> u32 {
        self.total
    }

    /// The loaded index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Whether the pack holds this object.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Look up an object and materialize its entry.
    pub fn entry_for(&self, id: &ObjectId) -> PackResult<Arc<PackEntry>> {
        let offset = self
            .index
            .lookup(id)
            .ok_or(PackError::NotFound(*id))?;
        self.entry_at(offset)
    }

    /// Materialize the entry at a pack byte offset, resolving delta chains
    /// recursively. The result is cached; repeated reads of hot entries do
    /// not touch the pack file.
    pub fn entry_at(&self, offset: u64) -> PackResult<Arc<PackEntry>> {
        if let Some(entry) = self.cache.get(&(self.id, offset)) {
            trace!(pack = %self.id.short_hex(), offset, "entry cache hit");
            return Ok(entry);
        }

        // Decode under the reader lock, then release it before recursing:
        // the base of a delta re-enters entry_at.
        let raw = {
            let mut reader = self.reader.lock().expect("lock poisoned");
            reader.seek(offset)?;
            let header = read_entry_header(&mut reader, offset)?;
            match header.kind {
                EntryKind::OfsDelta => {
                    let (distance, ofs_len) = read_base_distance(&mut reader, offset)?;
                    let delta = reader.inflate_exact(header.size, offset)?;
                    RawEntry::OfsDelta {
                        header_len: header.len + ofs_len,
                        distance,
                        delta,
                    }
                }
                EntryKind::RefDelta => {
                    let base = reader.read_id()?;
                    let delta = reader.inflate_exact(header.size, offset)?;
                    RawEntry::RefDelta {
                        header_len: header.len + 20,
                        base,
                        delta,
                    }
                }
                EntryKind::Commit => base_entry(ObjectKind::Commit, &header),
                EntryKind::Tree => base_entry(ObjectKind::Tree, &header),
                EntryKind::Blob => base_entry(ObjectKind::Blob, &header),
                EntryKind::Tag => base_entry(ObjectKind::Tag, &header),
            }
        };

        let entry = match raw {
            RawEntry::Base {
                kind,
                header_len,
                size,
            } => Arc::new(PackEntry::new_lazy(kind, offset, header_len, size)),
            RawEntry::OfsDelta {
                header_len,
                distance,
                delta,
            } => {
                let base_offset =
                    offset
                        .checked_sub(distance)
                        .ok_or_else(|| PackError::CorruptEntry {
                            offset,
                            reason: format!("delta base {distance} bytes before pack start"),
                        })?;
                let base = self.entry_at(base_offset)?;
                let payload = apply_delta(&self.payload(&base)?, &delta, offset)?;
                Arc::new(PackEntry::new_resolved(
                    base.kind(),
                    offset,
                    header_len,
                    Arc::new(payload),
                ))
            }
            RawEntry::RefDelta {
                header_len,
                base,
                delta,
            } => {
                let base = self.entry_for(&base)?;
                let payload = apply_delta(&self.payload(&base)?, &delta, offset)?;
                Arc::new(PackEntry::new_resolved(
                    base.kind(),
                    offset,
                    header_len,
                    Arc::new(payload),
                ))
            }
        };

        self.cache
            .put((self.id, offset), Arc::clone(&entry), entry.weight());
        Ok(entry)
    }

    /// The decompressed payload of an entry, inflating it on first access.
    pub fn payload(&self, entry: &PackEntry) -> PackResult<Arc<Vec<u8>>> {
        let mut slot = entry.payload_slot().lock().expect("lock poisoned");
        if let Some(payload) = slot.as_ref() {
            return Ok(Arc::clone(payload));
        }
        let bytes = {
            let mut reader = self.reader.lock().expect("lock poisoned");
            reader.seek(entry.offset() + entry.header_len() as u64)?;
            reader.inflate_exact(entry.size(), entry.offset())?
        };
        let payload = Arc::new(bytes);
        *slot = Some(Arc::clone(&payload));
        Ok(payload)
    }

    /// Read an object by id: its kind plus the fully decompressed payload.
    pub fn object_for(&self, id: &ObjectId) -> PackResult<(ObjectKind, Arc<Vec<u8>>)> {
        let entry = self.entry_for(id)?;
        let payload = self.payload(&entry)?;
        Ok((entry.kind(), payload))
    }
}

impl std::fmt::Debug for Pack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pack")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("objects", &self.index.object_count())
            .finish()
    }
}

fn base_entry(kind: ObjectKind, header: &EntryHeader) -> RawEntry {
    RawEntry::Base {
        kind,
        header_len: header.len,
        size: header.size,
    }
}

/// Read the pack header and compare the trailing checksum against the
/// index's record of it. Runs once at open.
fn verify(reader: &mut PackReader, index: &PackIndex) -> PackResult<(u32, u32)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != PACK_MAGIC {
        return Err(PackError::InvalidMagic {
            expected: "PACK".into(),
            actual: String::from_utf8_lossy(&magic).into_owned(),
        });
    }
    let version = reader.read_u32()?;
    if version != 2 {
        return Err(PackError::UnsupportedVersion(version));
    }
    let total = reader.read_u32()?;

    if reader.len() < 20 {
        return Err(PackError::CorruptEntry {
            offset: 0,
            reason: "pack too short for trailer".into(),
        });
    }
    reader.seek(reader.len() - 20)?;
    let trailer = reader.read_id()?;
    if trailer != index.pack_checksum() {
        return Err(PackError::ChecksumMismatch {
            expected: index.pack_checksum(),
            computed: trailer,
        });
    }
    Ok((version, total))
}
