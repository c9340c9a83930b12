use std::sync::{Arc, Mutex};

use relic_types::ObjectKind;

use crate::error::{PackError, PackResult};
use crate::reader::PackReader;

/// Fixed per-entry weight charged to the payload cache on top of the
/// payload bytes.
const ENTRY_OVERHEAD: u64 = 64;

/// The entry kinds a pack may contain: the four base object kinds plus the
/// two delta encodings. Type codes 0 and 5 are reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl EntryKind {
    /// Decode the 3-bit type field of an entry header. Reserved codes fail
    /// with `CorruptEntry`.
    pub fn from_bits(bits: u8, at: u64) -> PackResult<Self> {
        match bits {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            other => Err(PackError::CorruptEntry {
                offset: at,
                reason: format!("reserved entry type {other}"),
            }),
        }
    }

    /// The object kind for base entries; deltas inherit their base's kind.
    pub fn object_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }
}

/// Decoded size-and-type entry header.
#[derive(Clone, Copy, Debug)]
pub struct EntryHeader {
    pub kind: EntryKind,
    /// Decompressed size of the entry body (for deltas: of the delta
    /// stream, not the reconstructed object).
    pub size: u64,
    /// Number of header bytes consumed.
    pub len: usize,
}

/// Read an entry header at the reader's current position: the first byte
/// carries the type in bits 4-6 and size bits 0-3; continuation bytes
/// (MSB set) contribute 7 size bits each.
pub fn read_entry_header(r: &mut PackReader, at: u64) -> PackResult<EntryHeader> {
    let first = r.read_byte()?;
    let kind = EntryKind::from_bits((first >> 4) & 0x07, at)?;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4u32;
    let mut len = 1usize;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = r.read_byte()?;
        if shift > 63 {
            return Err(PackError::CorruptEntry {
                offset: at,
                reason: "entry size varint overflow".into(),
            });
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        len += 1;
    }
    Ok(EntryHeader { kind, size, len })
}

/// Read the negative base offset of an ofs-delta entry. Returns the
/// distance back from the entry's own offset and the number of bytes
/// consumed. Each continuation step computes
/// `value = ((value + 1) << 7) | low7`.
pub fn read_base_distance(r: &mut PackReader, at: u64) -> PackResult<(u64, usize)> {
    let mut byte = r.read_byte()?;
    let mut distance = u64::from(byte & 0x7f);
    let mut len = 1usize;
    while byte & 0x80 != 0 {
        byte = r.read_byte()?;
        distance = distance
            .checked_add(1)
            .and_then(|d| d.checked_mul(128))
            .ok_or_else(|| PackError::CorruptEntry {
                offset: at,
                reason: "base distance varint overflow".into(),
            })?
            | u64::from(byte & 0x7f);
        len += 1;
    }
    Ok((distance, len))
}

/// A materialized pack entry: the object kind plus a lazily decompressed
/// payload.
///
/// Entries are shared as `Arc<PackEntry>`: the payload cache holds one
/// clone and every consumer holds another, so the payload buffer is freed
/// exactly when the last user drops its handle. Eviction can never free a
/// buffer still in use.
#[derive(Debug)]
pub struct PackEntry {
    kind: ObjectKind,
    offset: u64,
    header_len: usize,
    size: u64,
    payload: Mutex<Option<Arc<Vec<u8>>>>,
}

impl PackEntry {
    /// A base entry whose payload is inflated on first access.
    pub(crate) fn new_lazy(kind: ObjectKind, offset: u64, header_len: usize, size: u64) -> Self {
        Self {
            kind,
            offset,
            header_len,
            size,
            payload: Mutex::new(None),
        }
    }

    /// A delta entry whose payload was just reconstructed.
    pub(crate) fn new_resolved(
        kind: ObjectKind,
        offset: u64,
        header_len: usize,
        payload: Arc<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            offset,
            header_len,
            size: payload.len() as u64,
            payload: Mutex::new(Some(payload)),
        }
    }

    /// The object kind of this entry (deltas report their base's kind).
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Byte offset of the entry header within the pack.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Decompressed payload size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn header_len(&self) -> usize {
        self.header_len
    }

    pub(crate) fn payload_slot(&self) -> &Mutex<Option<Arc<Vec<u8>>>> {
        &self.payload
    }

    /// Cache weight: payload bytes (once materialized) plus fixed
    /// overhead.
    pub(crate) fn weight(&self) -> u64 {
        let payload = self
            .payload
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map_or(0, |p| p.len() as u64);
        payload + ENTRY_OVERHEAD
    }
}
