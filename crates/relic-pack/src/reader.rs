use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::bufread::ZlibDecoder;

use relic_types::ObjectId;

use crate::error::{PackError, PackResult};

/// Seekable, buffered byte source over a pack file.
///
/// Tracks the absolute read position so entry decoding can cheaply detect
/// whether a seek is needed before a lazy payload read. A zlib session
/// borrows the reader exclusively (`&mut self`), which makes "one
/// decompressor alive at a time" a compile-time property; the position is
/// resynchronized when the session ends.
#[derive(Debug)]
pub struct PackReader {
    inner: BufReader<File>,
    pos: u64,
    len: u64,
}

impl PackReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            inner: BufReader::new(file),
            pos: 0,
            len,
        })
    }

    /// Total pack file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current absolute read position.
    pub fn offset(&self) -> u64 {
        self.pos
    }

    /// Position the reader at an absolute offset. A no-op when already
    /// there.
    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        if offset != self.pos {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_id(&mut self) -> io::Result<ObjectId> {
        let mut buf = [0u8; 20];
        self.read_exact(&mut buf)?;
        Ok(ObjectId::from_raw(buf))
    }

    /// Decompress one zlib stream starting at the current position and
    /// return its payload. `at` names the owning entry for error reporting.
    pub fn inflate(&mut self, at: u64) -> PackResult<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut decoder = ZlibDecoder::new(&mut self.inner);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| inflate_error(e, at))?;
        }
        self.resync()?;
        Ok(out)
    }

    /// Like [`inflate`](Self::inflate), but fails unless the stream
    /// decompresses to exactly `expected` bytes.
    pub fn inflate_exact(&mut self, expected: u64, at: u64) -> PackResult<Vec<u8>> {
        let out = self.inflate(at)?;
        if out.len() as u64 != expected {
            return Err(PackError::CorruptEntry {
                offset: at,
                reason: format!("decompressed {} bytes, expected {expected}", out.len()),
            });
        }
        Ok(out)
    }

    /// Recover the logical position after a zlib session consumed an
    /// unknown number of compressed bytes.
    fn resync(&mut self) -> io::Result<()> {
        self.pos = self.inner.stream_position()?;
        Ok(())
    }
}

fn inflate_error(e: io::Error, at: u64) -> PackError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            PackError::CorruptEntry {
                offset: at,
                reason: format!("zlib: {e}"),
            }
        }
        _ => PackError::Io(e),
    }
}
