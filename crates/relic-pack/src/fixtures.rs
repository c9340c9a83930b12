//! Test support: builds byte-exact pack v2 and pack index v2 files.
//!
//! Only compiled for tests (or with the `fixtures` feature, which the
//! store crate's test suite enables). The builder resolves delta entries
//! in memory so it can assign each entry its real content address, then
//! emits the same bytes a packer would: zlib-compressed bodies, CRC32s
//! over the raw entry ranges, and SHA-1 trailers on both files.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use relic_types::{ObjectId, ObjectKind};

use crate::delta::apply_delta;
use crate::index::INDEX_MAGIC;
use crate::pack::PACK_MAGIC;

/// One entry to place in a fixture pack, in pack order.
pub enum FixtureEntry {
    /// A base object stored whole.
    Base { kind: ObjectKind, payload: Vec<u8> },
    /// An ofs-delta against an earlier entry (by position in the slice).
    OfsDelta { base: usize, delta: Vec<u8> },
    /// A ref-delta against an earlier entry (by position in the slice).
    RefDelta { base: usize, delta: Vec<u8> },
    /// An ofs-delta carrying a deliberately broken delta stream, indexed
    /// under the given id. For corruption-handling tests; the checksums of
    /// the surrounding pack and index remain valid.
    BrokenOfsDelta {
        base: usize,
        delta: Vec<u8>,
        id: ObjectId,
    },
}

/// A built pack: the two files plus the resolved identity of each entry.
pub struct BuiltPack {
    pub pack: Vec<u8>,
    pub index: Vec<u8>,
    /// Per input entry: `(id, offset, kind, resolved payload)`.
    pub entries: Vec<(ObjectId, u64, ObjectKind, Vec<u8>)>,
}

impl BuiltPack {
    /// Write `pack-fixture.pack` and `pack-fixture.idx` under `dir` and
    /// return the path of the pack file.
    pub fn write_to(&self, dir: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
        let pack_path = dir.join("pack-fixture.pack");
        std::fs::write(&pack_path, &self.pack)?;
        std::fs::write(dir.join("pack-fixture.idx"), &self.index)?;
        Ok(pack_path)
    }
}

/// Build a pack and matching index from the given entries.
///
/// Panics on malformed input (unknown base positions, deltas that do not
/// apply); fixtures are test code and their inputs are static.
pub fn build_pack(entries: &[FixtureEntry]) -> BuiltPack {
    let mut pack = Vec::new();
    pack.extend_from_slice(&PACK_MAGIC);
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());

    let mut resolved: Vec<(ObjectId, u64, ObjectKind, Vec<u8>)> = Vec::new();
    let mut ranges: Vec<(u64, u64)> = Vec::new();

    for entry in entries {
        let offset = pack.len() as u64;
        let (id, kind, payload) = match entry {
            FixtureEntry::Base { kind, payload } => {
                pack.extend_from_slice(&encode_entry_header(type_code(*kind), payload.len() as u64));
                pack.extend_from_slice(&deflate(payload));
                (ObjectId::hash_object(*kind, payload), *kind, payload.clone())
            }
            FixtureEntry::OfsDelta { base, delta } => {
                let (_, base_offset, base_kind, base_payload) = &resolved[*base];
                pack.extend_from_slice(&encode_entry_header(6, delta.len() as u64));
                pack.extend_from_slice(&encode_base_distance(offset - base_offset));
                pack.extend_from_slice(&deflate(delta));
                let payload = apply_delta(base_payload, delta, offset).expect("fixture delta");
                (ObjectId::hash_object(*base_kind, &payload), *base_kind, payload)
            }
            FixtureEntry::RefDelta { base, delta } => {
                let (base_id, _, base_kind, base_payload) = &resolved[*base];
                pack.extend_from_slice(&encode_entry_header(7, delta.len() as u64));
                pack.extend_from_slice(base_id.as_bytes());
                pack.extend_from_slice(&deflate(delta));
                let payload = apply_delta(base_payload, delta, offset).expect("fixture delta");
                (ObjectId::hash_object(*base_kind, &payload), *base_kind, payload)
            }
            FixtureEntry::BrokenOfsDelta { base, delta, id } => {
                let (_, base_offset, base_kind, _) = &resolved[*base];
                pack.extend_from_slice(&encode_entry_header(6, delta.len() as u64));
                pack.extend_from_slice(&encode_base_distance(offset - base_offset));
                pack.extend_from_slice(&deflate(delta));
                (*id, *base_kind, Vec::new())
            }
        };
        resolved.push((id, offset, kind, payload));
        ranges.push((offset, pack.len() as u64));
    }

    let pack_checksum: [u8; 20] = Sha1::digest(&pack).into();
    pack.extend_from_slice(&pack_checksum);

    let index = build_index(&resolved, &ranges, &pack, ObjectId::from_raw(pack_checksum));
    BuiltPack {
        pack,
        index,
        entries: resolved,
    }
}

fn build_index(
    resolved: &[(ObjectId, u64, ObjectKind, Vec<u8>)],
    ranges: &[(u64, u64)],
    pack: &[u8],
    pack_checksum: ObjectId,
) -> Vec<u8> {
    let mut order: Vec<usize> = (0..resolved.len()).collect();
    order.sort_by_key(|&i| resolved[i].0);

    let mut index = Vec::new();
    index.extend_from_slice(&INDEX_MAGIC);
    index.extend_from_slice(&2u32.to_be_bytes());

    let mut fan_out = [0u32; 256];
    for (id, ..) in resolved {
        let first = id.as_bytes()[0] as usize;
        for slot in &mut fan_out[first..] {
            *slot += 1;
        }
    }
    for count in fan_out {
        index.extend_from_slice(&count.to_be_bytes());
    }
    for &i in &order {
        index.extend_from_slice(resolved[i].0.as_bytes());
    }
    for &i in &order {
        let (start, end) = ranges[i];
        let crc = crc32fast::hash(&pack[start as usize..end as usize]);
        index.extend_from_slice(&crc.to_be_bytes());
    }
    for &i in &order {
        index.extend_from_slice(&(resolved[i].1 as u32).to_be_bytes());
    }
    index.extend_from_slice(pack_checksum.as_bytes());
    let self_checksum: [u8; 20] = Sha1::digest(&index).into();
    index.extend_from_slice(&self_checksum);
    index
}

/// A small pack exercising all entry shapes: three base objects, an
/// ofs-delta and a ref-delta. Returns `(pack bytes, index bytes,
/// (id, offset) pairs)`.
pub fn sample_pack() -> (Vec<u8>, Vec<u8>, Vec<(ObjectId, u64)>) {
    let blob = b"the quick brown fox jumps over the lazy dog\n".to_vec();
    let mut delta = encode_size(blob.len() as u64);
    delta.extend_from_slice(&encode_size(blob.len() as u64 + 6));
    delta.push(0x90);
    delta.push(blob.len() as u8);
    delta.push(0x06);
    delta.extend_from_slice(b"again\n");

    let built = build_pack(&[
        FixtureEntry::Base {
            kind: ObjectKind::Blob,
            payload: blob,
        },
        FixtureEntry::Base {
            kind: ObjectKind::Blob,
            payload: b"second blob\n".to_vec(),
        },
        FixtureEntry::Base {
            kind: ObjectKind::Commit,
            payload: b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                       author A U Thor <author@example.com> 1700000000 +0000\n\
                       committer A U Thor <author@example.com> 1700000000 +0000\n\n\
                       fixture\n"
                .to_vec(),
        },
        FixtureEntry::OfsDelta { base: 0, delta: delta.clone() },
        FixtureEntry::RefDelta { base: 1, delta: ref_delta_payload() },
    ]);
    let pairs = built
        .entries
        .iter()
        .map(|(id, offset, ..)| (*id, *offset))
        .collect();
    (built.pack, built.index, pairs)
}

fn ref_delta_payload() -> Vec<u8> {
    let base = b"second blob\n";
    let mut delta = encode_size(base.len() as u64);
    delta.extend_from_slice(&encode_size(8));
    delta.push(0x90);
    delta.push(0x07);
    delta.push(0x01);
    delta.push(b'!');
    delta
}

/// Pack entry size-and-type header (type in bits 4-6 of the first byte).
pub fn encode_entry_header(type_code: u8, mut size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

/// Ofs-delta negative offset encoding (inverse of `read_base_distance`).
pub fn encode_base_distance(mut distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        out.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    out.reverse();
    out
}

/// Little-endian base-7 varint used in delta size prefixes.
pub fn encode_size(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

fn type_code(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    }
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory deflate");
    encoder.finish().expect("in-memory deflate")
}
