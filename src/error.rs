// Error type shared by the codec, the section/file writers and the reader.
//
// Encoding has exactly one fatal class of failure (a value that does not fit
// the width the format reserves for it). The variants below split that class
// by where it was detected so that callers can report something useful; all
// of them abort the enclosing tile/section/file write.

use thiserror::Error;

/// Errors produced while encoding, writing or reading DEM data.
#[derive(Error, Debug)]
pub enum DemError {
    /// A value does not fit the requested fixed bit width.
    #[error("encoding overflow: value {value} does not fit in {bits} bits")]
    EncodingOverflow { value: u64, bits: u32 },

    /// The unary length part of a hybrid value exceeds the tile limit.
    #[error("encoding overflow: hybrid length part {length} exceeds limit {limit}")]
    LengthOverflow { length: u32, limit: u32 },

    /// A tile header field does not fit the section's declared byte width.
    #[error("encoding overflow: {field} value {value} does not fit in {size} byte(s)")]
    FieldOverflow {
        field: &'static str,
        value: i64,
        size: usize,
    },

    /// Caller-supplied data is malformed (matrix shape, geometry, file layout).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A bitstream or file ended before the decoder was done.
    #[error("truncated input: {0}")]
    Truncated(&'static str),

    /// I/O error while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DemError {
    /// True for the overflow family, which is the only failure an encoder
    /// can produce from well-formed input.
    pub fn is_overflow(&self) -> bool {
        matches!(
            self,
            Self::EncodingOverflow { .. } | Self::LengthOverflow { .. } | Self::FieldOverflow { .. }
        )
    }
}

/// Result alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DemError::EncodingOverflow { value: 9, bits: 3 };
        assert!(err.to_string().contains("9"));
        assert!(err.to_string().contains("3 bits"));

        let err = DemError::FieldOverflow {
            field: "baseHeight",
            value: 300,
            size: 1,
        };
        assert!(err.to_string().contains("baseHeight"));
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn overflow_family() {
        assert!(DemError::LengthOverflow { length: 20, limit: 16 }.is_overflow());
        assert!(!DemError::Truncated("bitstream").is_overflow());
        assert!(!DemError::InvalidInput("x".into()).is_overflow());
    }
}
