use crate::error::{PackError, PackResult};

/// Reconstruct an object payload from a base payload and a delta stream.
///
/// The delta opens with two little-endian base-7 varints giving the
/// expected source and result sizes, followed by instructions: a byte with
/// the MSB set is a copy (bits 0-3 select offset bytes, bits 4-6 select
/// size bytes, a missing size means `0x10000`); a nonzero byte with the MSB
/// clear inserts that many literal bytes; `0x00` is reserved.
///
/// `at` is the pack offset of the delta entry, used in error reports.
pub fn apply_delta(src: &[u8], delta: &[u8], at: u64) -> PackResult<Vec<u8>> {
    let corrupt = |reason: String| PackError::CorruptDelta { offset: at, reason };

    let mut pos = 0usize;
    let src_size = read_size(delta, &mut pos, at)?;
    let dst_size = read_size(delta, &mut pos, at)?;
    if src_size != src.len() as u64 {
        return Err(corrupt(format!(
            "base is {} bytes, delta expects {src_size}",
            src.len()
        )));
    }

    let mut out = Vec::with_capacity(dst_size as usize);
    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            // Copy from the base.
            let mut offset = 0u64;
            for i in 0..4 {
                if op & (1 << i) != 0 {
                    offset |= u64::from(take(delta, &mut pos, at)?) << (8 * i);
                }
            }
            let mut size = 0u64;
            for i in 0..3 {
                if op & (0x10 << i) != 0 {
                    size |= u64::from(take(delta, &mut pos, at)?) << (8 * i);
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let end = offset
                .checked_add(size)
                .ok_or_else(|| corrupt("copy range overflow".into()))?;
            if end > src.len() as u64 {
                return Err(corrupt(format!(
                    "copy of {size} bytes at {offset} exceeds base of {} bytes",
                    src.len()
                )));
            }
            out.extend_from_slice(&src[offset as usize..end as usize]);
        } else if op != 0 {
            // Insert literal bytes from the delta stream.
            let n = op as usize;
            if pos + n > delta.len() {
                return Err(corrupt(format!("insert of {n} bytes past end of delta")));
            }
            out.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            return Err(corrupt("reserved zero instruction".into()));
        }
    }

    if out.len() as u64 != dst_size {
        return Err(corrupt(format!(
            "reconstructed {} bytes, expected {dst_size}",
            out.len()
        )));
    }
    Ok(out)
}

fn take(delta: &[u8], pos: &mut usize, at: u64) -> PackResult<u8> {
    let byte = *delta.get(*pos).ok_or_else(|| PackError::CorruptDelta {
        offset: at,
        reason: "truncated delta instruction".into(),
    })?;
    *pos += 1;
    Ok(byte)
}

/// Little-endian base-7 varint used for the delta's size prefix.
fn read_size(delta: &[u8], pos: &mut usize, at: u64) -> PackResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = take(delta, pos, at)?;
        if shift > 63 {
            return Err(PackError::CorruptDelta {
                offset: at,
                reason: "size varint overflow".into(),
            });
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::encode_size;

    fn delta_header(src: u64, dst: u64) -> Vec<u8> {
        let mut delta = encode_size(src);
        delta.extend_from_slice(&encode_size(dst));
        delta
    }

    #[test]
    fn copy_then_insert() {
        let base = b"abc";
        let mut delta = delta_header(3, 6);
        // Copy offset=0 size=3, then insert "XYZ".
        delta.extend_from_slice(&[0x90, 0x03]);
        delta.push(0x03);
        delta.extend_from_slice(b"XYZ");

        let out = apply_delta(base, &delta, 0).unwrap();
        assert_eq!(out, b"abcXYZ");
    }

    #[test]
    fn grow_by_appending() {
        let base = b"aaaaaaaa";
        let mut delta = delta_header(8, 10);
        delta.extend_from_slice(&[0x90, 0x08]);
        delta.push(0x02);
        delta.extend_from_slice(b"bb");

        let out = apply_delta(base, &delta, 0).unwrap();
        assert_eq!(out, b"aaaaaaaabb");
    }

    #[test]
    fn copy_with_offset_and_size_bytes() {
        let base: Vec<u8> = (0..=255u8).collect();
        let mut delta = delta_header(256, 4);
        // offset = 0x80 (one offset byte), size = 4 (one size byte).
        delta.extend_from_slice(&[0x91, 0x80, 0x04]);

        let out = apply_delta(&base, &delta, 0).unwrap();
        assert_eq!(out, &base[0x80..0x84]);
    }

    #[test]
    fn omitted_size_defaults_to_64k() {
        let base = vec![7u8; 0x10000];
        let mut delta = delta_header(0x10000, 0x10000);
        // Copy with no offset and no size bytes.
        delta.push(0x80);

        let out = apply_delta(&base, &delta, 0).unwrap();
        assert_eq!(out.len(), 0x10000);
    }

    #[test]
    fn rejects_zero_instruction() {
        let mut delta = delta_header(0, 1);
        delta.push(0x00);
        let err = apply_delta(b"", &delta, 7).unwrap_err();
        assert!(matches!(err, PackError::CorruptDelta { offset: 7, .. }));
    }

    #[test]
    fn rejects_copy_past_base() {
        let mut delta = delta_header(3, 8);
        delta.extend_from_slice(&[0x90, 0x08]);
        let err = apply_delta(b"abc", &delta, 0).unwrap_err();
        assert!(matches!(err, PackError::CorruptDelta { .. }));
    }

    #[test]
    fn rejects_result_size_mismatch() {
        let mut delta = delta_header(3, 9);
        delta.extend_from_slice(&[0x90, 0x03]);
        let err = apply_delta(b"abc", &delta, 0).unwrap_err();
        match err {
            PackError::CorruptDelta { reason, .. } => {
                assert!(reason.contains("expected 9"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_base_size_mismatch() {
        let delta = delta_header(5, 1);
        let err = apply_delta(b"abc", &delta, 0).unwrap_err();
        assert!(matches!(err, PackError::CorruptDelta { .. }));
    }

    #[test]
    fn rejects_truncated_insert() {
        let mut delta = delta_header(0, 4);
        delta.push(0x04);
        delta.extend_from_slice(b"ab");
        let err = apply_delta(b"", &delta, 0).unwrap_err();
        assert!(matches!(err, PackError::CorruptDelta { .. }));
    }

    #[test]
    fn multibyte_size_prefix() {
        let base = vec![1u8; 300];
        let mut delta = delta_header(300, 300);
        // Copy all 300 bytes: offset 0, size 300 = 0x12C (two size bytes).
        delta.extend_from_slice(&[0xb0, 0x2c, 0x01]);
        let out = apply_delta(&base, &delta, 0).unwrap();
        assert_eq!(out, base);
    }
}
