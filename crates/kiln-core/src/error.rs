//! Error types for tensor descriptor records.

use std::error::Error;
use std::fmt;

/// Errors from encoding or decoding a [`TensorDescriptor`](crate::TensorDescriptor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// The shape has more dimensions than a record can hold.
    RankTooLarge {
        /// Rank of the offending shape.
        rank: usize,
        /// Maximum supported rank.
        max: usize,
    },
    /// The buffer is shorter than one record.
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },
    /// The record names an element type this build does not know.
    UnknownDType {
        /// The raw type code found in the record.
        code: u8,
    },
    /// Element count times element size overflows `usize`.
    SizeOverflow,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankTooLarge { rank, max } => {
                write!(f, "tensor rank {rank} exceeds descriptor maximum {max}")
            }
            Self::BufferTooSmall { needed, got } => {
                write!(f, "descriptor record needs {needed} bytes, buffer has {got}")
            }
            Self::UnknownDType { code } => write!(f, "unknown dtype code {code}"),
            Self::SizeOverflow => write!(f, "tensor byte size overflows usize"),
        }
    }
}

impl Error for DescriptorError {}
