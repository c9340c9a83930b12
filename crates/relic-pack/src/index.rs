use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use relic_types::ObjectId;

use crate::error::{PackError, PackResult};

/// Magic bytes opening a pack index v2.
pub const INDEX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

/// Offset words with this bit set index into the large-offsets table.
const LARGE_OFFSET_FLAG: u32 = 1 << 31;

/// Random-access map from object id to in-pack byte offset.
///
/// Layout (all integers big-endian):
/// - magic `\xfftOc`, version `2`
/// - fan-out table: 256 words, `fan_out[i]` = number of objects whose first
///   byte is `<= i`
/// - sorted 20-byte object ids, CRC32s and 4-byte offsets (parallel arrays)
/// - 64-bit offsets for entries whose 4-byte word has the high bit set
/// - pack checksum, then the index's own checksum over everything before it
#[derive(Debug)]
pub struct PackIndex {
    fan_out: [u32; 256],
    object_ids: Vec<ObjectId>,
    crc32s: Vec<u32>,
    offsets: Vec<u32>,
    large_offsets: Vec<u64>,
    pack_checksum: ObjectId,
}

impl PackIndex {
    /// Load and verify an index file.
    pub fn open(path: &Path) -> PackResult<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Parse an index from a reader, feeding every byte into a running
    /// SHA-1 and comparing it against the trailing self-checksum.
    pub fn parse<R: Read>(reader: R) -> PackResult<Self> {
        let mut r = HashingReader::new(reader);

        let mut magic = [0u8; 4];
        r.fill(&mut magic, "magic")?;
        if magic != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: "\\xfftOc".into(),
                actual: format!("{magic:02x?}"),
            });
        }
        let version = r.read_u32("version")?;
        if version != 2 {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut fan_out = [0u32; 256];
        for i in 0..fan_out.len() {
            let word = r.read_u32("fan-out")?;
            if i > 0 && word < fan_out[i - 1] {
                return Err(PackError::CorruptIndex {
                    offset: r.position(),
                    reason: format!("fan-out not monotonic at byte {i}"),
                });
            }
            fan_out[i] = word;
        }
        let total = fan_out[255] as usize;

        let mut object_ids = Vec::with_capacity(total);
        for _ in 0..total {
            object_ids.push(r.read_id("object id")?);
        }

        let mut crc32s = Vec::with_capacity(total);
        for _ in 0..total {
            crc32s.push(r.read_u32("crc32")?);
        }

        let mut offsets = Vec::with_capacity(total);
        for _ in 0..total {
            offsets.push(r.read_u32("offset")?);
        }

        let large = offsets
            .iter()
            .filter(|&&o| o & LARGE_OFFSET_FLAG != 0)
            .count();
        let mut large_offsets = Vec::with_capacity(large);
        for _ in 0..large {
            large_offsets.push(r.read_u64("large offset")?);
        }

        let pack_checksum = r.read_id("pack checksum")?;

        // Snapshot the digest before consuming the self-checksum: the
        // trailer hash covers everything that precedes it.
        let computed = r.digest();
        let index_checksum = r.read_id("index checksum")?;
        if computed != index_checksum {
            return Err(PackError::ChecksumMismatch {
                expected: index_checksum,
                computed,
            });
        }

        Ok(Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            large_offsets,
            pack_checksum,
        })
    }

    /// Look up the pack byte offset of an object. `None` when the object is
    /// not in this pack. O(log n) over the fan-out-narrowed slice.
    pub fn lookup(&self, id: &ObjectId) -> Option<u64> {
        let first = id.as_bytes()[0] as usize;
        let lo = if first == 0 {
            0
        } else {
            self.fan_out[first - 1] as usize
        };
        let hi = self.fan_out[first] as usize;

        let pos = self.object_ids[lo..hi].binary_search(id).ok()?;
        Some(self.resolve_offset(lo + pos))
    }

    /// Total number of objects in the index.
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    /// Whether the pack holds this object.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Checksum of the pack file this index describes.
    pub fn pack_checksum(&self) -> ObjectId {
        self.pack_checksum
    }

    /// All object ids in index order (ascending).
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.object_ids
    }

    /// CRC32 of the raw pack entry bytes at position `pos`.
    pub fn crc32_at(&self, pos: usize) -> u32 {
        self.crc32s[pos]
    }

    /// Iterate over `(object id, pack offset)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        self.object_ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, self.resolve_offset(pos)))
    }

    fn resolve_offset(&self, pos: usize) -> u64 {
        let raw = self.offsets[pos];
        if raw & LARGE_OFFSET_FLAG != 0 {
            self.large_offsets[(raw & !LARGE_OFFSET_FLAG) as usize]
        } else {
            u64::from(raw)
        }
    }
}

/// Reader adapter feeding every consumed byte into a running SHA-1.
struct HashingReader<R> {
    inner: R,
    hasher: Sha1,
    position: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
            position: 0,
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    /// Digest of everything consumed so far.
    fn digest(&self) -> ObjectId {
        ObjectId::from_raw(self.hasher.clone().finalize().into())
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> PackResult<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PackError::CorruptIndex {
                    offset: self.position,
                    reason: format!("truncated {what}"),
                }
            } else {
                PackError::Io(e)
            }
        })?;
        self.hasher.update(&buf[..]);
        self.position += buf.len() as u64;
        Ok(())
    }

    fn read_u32(&mut self, what: &str) -> PackResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, what)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self, what: &str) -> PackResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, what)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_id(&mut self, what: &str) -> PackResult<ObjectId> {
        let mut buf = [0u8; 20];
        self.fill(&mut buf, what)?;
        Ok(ObjectId::from_raw(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn id_from_hex(s: &str) -> ObjectId {
        ObjectId::from_hex(s).unwrap()
    }

    /// Build raw index bytes by hand so the test controls fan-out shape and
    /// offset words exactly.
    fn raw_index(
        ids: &[ObjectId],
        offsets: &[u32],
        large_offsets: &[u64],
        pack_checksum: ObjectId,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&INDEX_MAGIC);
        buf.extend_from_slice(&2u32.to_be_bytes());
        let mut fan_out = [0u32; 256];
        for id in ids {
            let first = id.as_bytes()[0] as usize;
            for slot in &mut fan_out[first..] {
                *slot += 1;
            }
        }
        for count in fan_out {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for id in ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for _ in ids {
            buf.extend_from_slice(&0u32.to_be_bytes());
        }
        for offset in offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        for offset in large_offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(pack_checksum.as_bytes());
        let digest: [u8; 20] = Sha1::digest(&buf).into();
        buf.extend_from_slice(&digest);
        buf
    }

    #[test]
    fn lookup_uses_fanout_slice() {
        let ids = [
            id_from_hex("0010000000000000000000000000000000000000"),
            id_from_hex("0100000000000000000000000000000000000000"),
            id_from_hex("0110000000000000000000000000000000000000"),
        ];
        let bytes = raw_index(&ids, &[0, 1, 2], &[], ObjectId::null());
        let idx = PackIndex::parse(bytes.as_slice()).unwrap();

        assert_eq!(idx.object_count(), 3);
        assert_eq!(idx.lookup(&ids[1]), Some(1));
        let miss = id_from_hex("0100000000000000000000000000000000000001");
        assert_eq!(idx.lookup(&miss), None);
    }

    #[test]
    fn lookup_resolves_large_offsets() {
        let ids = [
            id_from_hex("2000000000000000000000000000000000000000"),
            id_from_hex("a000000000000000000000000000000000000000"),
        ];
        // Second entry's offset word has the high bit set and indexes the
        // 64-bit table.
        let bytes = raw_index(&ids, &[12, 0x8000_0000], &[0x1_2345_6789], ObjectId::null());
        let idx = PackIndex::parse(bytes.as_slice()).unwrap();

        assert_eq!(idx.lookup(&ids[0]), Some(12));
        assert_eq!(idx.lookup(&ids[1]), Some(0x1_2345_6789));
    }

    #[test]
    fn lookup_agrees_with_linear_scan() {
        let (_, idx_bytes, entries) = fixtures::sample_pack();
        let idx = PackIndex::parse(idx_bytes.as_slice()).unwrap();

        for (id, offset) in &entries {
            let scanned = idx
                .entries()
                .find(|(candidate, _)| candidate == id)
                .map(|(_, offset)| offset);
            assert_eq!(idx.lookup(id), scanned);
            assert_eq!(idx.lookup(id), Some(*offset));
        }
        let absent = ObjectId::from_raw([0xee; 20]);
        assert_eq!(idx.lookup(&absent), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = PackIndex::parse(&b"NOPExxxxxxxx"[..]).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&INDEX_MAGIC);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        let err = PackIndex::parse(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(1)));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&INDEX_MAGIC);
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        let err = PackIndex::parse(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex { .. }));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let ids = [id_from_hex("3000000000000000000000000000000000000000")];
        let mut bytes = raw_index(&ids, &[12], &[], ObjectId::null());
        // Flip a byte inside the object id table.
        let flip = 8 + 256 * 4 + 3;
        bytes[flip] ^= 0xff;
        let err = PackIndex::parse(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch { .. }));
    }

    #[test]
    fn rejects_non_monotonic_fanout() {
        let ids = [id_from_hex("0100000000000000000000000000000000000000")];
        let mut bytes = raw_index(&ids, &[0], &[], ObjectId::null());
        // fan_out[1] is 1; dropping fan_out[2] to 0 breaks monotonicity.
        bytes[8 + 2 * 4 + 3] = 0;
        let err = PackIndex::parse(bytes.as_slice()).unwrap_err();
        match err {
            PackError::CorruptIndex { reason, .. } => {
                assert!(reason.contains("monotonic"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
