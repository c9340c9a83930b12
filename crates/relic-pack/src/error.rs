use thiserror::Error;

use relic_types::ObjectId;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("object not found in pack: {0}")]
    NotFound(ObjectId),

    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack index at offset {offset}: {reason}")]
    CorruptIndex { offset: u64, reason: String },

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("corrupt delta at offset {offset}: {reason}")]
    CorruptDelta { offset: u64, reason: String },

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackError {
    /// Whether this error indicates the pack itself is damaged. The
    /// repository disables a pack for the process lifetime on the first
    /// such error.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::UnsupportedVersion(_)
                | Self::CorruptIndex { .. }
                | Self::CorruptEntry { .. }
                | Self::CorruptDelta { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

pub type PackResult<T> = Result<T, PackError>;
