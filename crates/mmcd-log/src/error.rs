//! Codec errors

use thiserror::Error;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not an MMCD log (bad magic {found:?})")]
    BadMagic { found: [u8; 4] },

    #[error("Truncated {section}: expected {expected} bytes, got {got}")]
    Truncated {
        section: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Not an MMCd PalmOS log: type={type_code:?} creator={creator:?}")]
    NotLegacyLog { type_code: String, creator: String },

    #[error("Sensor index {0} out of range")]
    InvalidIndex(usize),

    #[error("Too many sensor indices: {0}")]
    TooManyIndices(usize),

    #[error("Sample timestamp cannot be stored")]
    TimestampOutOfRange,

    #[error("Log contains no samples")]
    NoSamples,
}
