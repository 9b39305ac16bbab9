use std::io;

use crate::format::FourCC;

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Fatal decode failures. Every variant records the byte offset it was raised at.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of data at offset {offset:#x}")]
    UnexpectedEof { offset: u64 },

    #[error("invalid {buffer} stride {stride} at offset {offset:#x}")]
    InvalidStride { offset: u64, buffer: &'static str, stride: i8 },

    #[error("incorrect {buffer} stride at offset {offset:#x}: expected {expected}, found {found}")]
    IncorrectStrideValue { offset: u64, buffer: &'static str, expected: i8, found: i8 },

    #[error("invalid magic at offset {offset:#x}: expected {expected}, found {found}")]
    BadMagic { offset: u64, expected: FourCC, found: FourCC },

    #[error("unknown {kind} value {value} at offset {offset:#x}")]
    InvalidEnum { offset: u64, kind: &'static str, value: u64 },

    #[error("variable-length integer at offset {offset:#x} exceeds 70 bits")]
    VarintOverflow { offset: u64 },

    #[error("nesting deeper than {limit} levels at offset {offset:#x}")]
    DepthLimitExceeded { offset: u64, limit: usize },

    #[error(
        "declared length {declared} at offset {offset:#x} exceeds the {remaining} remaining bytes"
    )]
    LengthOverrun { offset: u64, declared: u64, remaining: usize },

    #[error("failed to parse record at offset {offset:#x}: {message}")]
    Binary { offset: u64, message: String },
}

impl DecodeError {
    /// Converts a `binrw` failure for a record that started at `offset`.
    pub(crate) fn from_binrw(err: binrw::Error, offset: u64) -> Self {
        match err {
            binrw::Error::Backtrace(bt) => Self::from_binrw(*bt.error, offset),
            binrw::Error::Io(e) => Self::from_io(e, offset),
            other => Self::Binary { offset, message: other.to_string() },
        }
    }

    pub(crate) fn from_io(err: io::Error, offset: u64) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof { offset }
        } else {
            Self::Binary { offset, message: err.to_string() }
        }
    }

    /// Byte offset the failure was detected at.
    pub fn offset(&self) -> u64 {
        match *self {
            Self::UnexpectedEof { offset }
            | Self::InvalidStride { offset, .. }
            | Self::IncorrectStrideValue { offset, .. }
            | Self::BadMagic { offset, .. }
            | Self::InvalidEnum { offset, .. }
            | Self::VarintOverflow { offset }
            | Self::DepthLimitExceeded { offset, .. }
            | Self::LengthOverrun { offset, .. }
            | Self::Binary { offset, .. } => offset,
        }
    }
}
