//! Tensor element types, shapes and the fixed-size descriptor record.
//!
//! A [`TensorDescriptor`] is the bookkeeping record a declaration step
//! stores in the metadata pool for every tensor it binds. It is encoded
//! into a fixed [`TensorDescriptor::RECORD_BYTES`]-byte little-endian
//! record so that the metadata footprint of a model is known offline.

use smallvec::SmallVec;

use crate::error::DescriptorError;

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 8-bit integer (quantized activations and weights).
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer (quantized biases, indices).
    I32,
    /// 32-bit IEEE float.
    F32,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }

    /// Natural alignment of one element in bytes.
    pub fn align(self) -> usize {
        self.size_bytes()
    }

    fn code(self) -> u8 {
        match self {
            Self::U8 => 1,
            Self::I8 => 2,
            Self::I16 => 3,
            Self::I32 => 4,
            Self::F32 => 5,
        }
    }

    fn from_code(code: u8) -> Result<Self, DescriptorError> {
        match code {
            1 => Ok(Self::U8),
            2 => Ok(Self::I8),
            3 => Ok(Self::I16),
            4 => Ok(Self::I32),
            5 => Ok(Self::F32),
            other => Err(DescriptorError::UnknownDType { code: other }),
        }
    }
}

/// Tensor dimensions, outermost first.
///
/// Uses `SmallVec<[u32; 4]>` so that every shape a descriptor record
/// can hold stays inline.
pub type Shape = SmallVec<[u32; 4]>;

/// Bookkeeping record for one tensor bound in the ram pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDescriptor {
    /// Element type.
    pub dtype: DType,
    /// Dimensions, at most [`TensorDescriptor::MAX_RANK`].
    pub shape: Shape,
    /// Byte offset of the payload within the ram pool.
    pub offset: u32,
}

impl TensorDescriptor {
    /// Maximum number of dimensions a record can hold.
    pub const MAX_RANK: usize = 4;

    /// Encoded record size in bytes: dtype, rank, two reserved bytes,
    /// `MAX_RANK` little-endian `u32` dims and a `u32` offset.
    pub const RECORD_BYTES: usize = 4 + 4 * Self::MAX_RANK + 4;

    /// Required alignment of an encoded record.
    pub const RECORD_ALIGN: usize = 4;

    /// Create a descriptor with a zero offset (filled in once the payload is placed).
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
            offset: 0,
        }
    }

    /// Number of elements (product of dims; `1` for a scalar).
    ///
    /// Returns `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> Result<usize, DescriptorError> {
        self.element_count()
            .and_then(|n| n.checked_mul(self.dtype.size_bytes()))
            .ok_or(DescriptorError::SizeOverflow)
    }

    /// Encode into the first [`RECORD_BYTES`](Self::RECORD_BYTES) bytes of `out`.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), DescriptorError> {
        if self.shape.len() > Self::MAX_RANK {
            return Err(DescriptorError::RankTooLarge {
                rank: self.shape.len(),
                max: Self::MAX_RANK,
            });
        }
        let got = out.len();
        let record = out
            .get_mut(..Self::RECORD_BYTES)
            .ok_or(DescriptorError::BufferTooSmall {
                needed: Self::RECORD_BYTES,
                got,
            })?;
        record.fill(0);
        record[0] = self.dtype.code();
        record[1] = self.shape.len() as u8;
        for (i, &dim) in self.shape.iter().enumerate() {
            let at = 4 + 4 * i;
            record[at..at + 4].copy_from_slice(&dim.to_le_bytes());
        }
        let at = 4 + 4 * Self::MAX_RANK;
        record[at..at + 4].copy_from_slice(&self.offset.to_le_bytes());
        Ok(())
    }

    /// Decode a record previously written by [`encode_into`](Self::encode_into).
    pub fn decode(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let record = bytes
            .get(..Self::RECORD_BYTES)
            .ok_or(DescriptorError::BufferTooSmall {
                needed: Self::RECORD_BYTES,
                got: bytes.len(),
            })?;
        let dtype = DType::from_code(record[0])?;
        let rank = record[1] as usize;
        if rank > Self::MAX_RANK {
            return Err(DescriptorError::RankTooLarge {
                rank,
                max: Self::MAX_RANK,
            });
        }
        let read_u32 = |at: usize| {
            u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        let shape = (0..rank).map(|i| read_u32(4 + 4 * i)).collect();
        let offset = read_u32(4 + 4 * Self::MAX_RANK);
        Ok(Self {
            dtype,
            shape,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn byte_len_multiplies_dims_and_element_size() {
        let d = TensorDescriptor::new(DType::F32, Shape::from_slice(&[1, 28, 28, 1]));
        assert_eq!(d.byte_len().unwrap(), 28 * 28 * 4);
    }

    #[test]
    fn scalar_has_one_element() {
        let d = TensorDescriptor::new(DType::I8, Shape::new());
        assert_eq!(d.element_count(), Some(1));
        assert_eq!(d.byte_len().unwrap(), 1);
    }

    #[test]
    fn byte_len_overflow_is_reported() {
        let d = TensorDescriptor::new(DType::F32, Shape::from_slice(&[u32::MAX, u32::MAX, u32::MAX]));
        assert_eq!(d.byte_len(), Err(DescriptorError::SizeOverflow));
    }

    #[test]
    fn encode_rejects_rank_above_max() {
        let d = TensorDescriptor::new(DType::U8, Shape::from_slice(&[1, 1, 1, 1, 1]));
        let mut buf = [0u8; TensorDescriptor::RECORD_BYTES];
        assert_eq!(
            d.encode_into(&mut buf),
            Err(DescriptorError::RankTooLarge { rank: 5, max: 4 })
        );
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let d = TensorDescriptor::new(DType::U8, Shape::from_slice(&[4]));
        let mut buf = [0u8; 8];
        assert!(matches!(
            d.encode_into(&mut buf),
            Err(DescriptorError::BufferTooSmall { needed: 24, got: 8 })
        ));
    }

    #[test]
    fn decode_rejects_unknown_dtype() {
        let buf = [0u8; TensorDescriptor::RECORD_BYTES];
        assert_eq!(
            TensorDescriptor::decode(&buf),
            Err(DescriptorError::UnknownDType { code: 0 })
        );
    }

    fn arb_dtype() -> impl Strategy<Value = DType> {
        prop_oneof![
            Just(DType::U8),
            Just(DType::I8),
            Just(DType::I16),
            Just(DType::I32),
            Just(DType::F32),
        ]
    }

    proptest! {
        #[test]
        fn decode_recovers_encoded_descriptor(
            dtype in arb_dtype(),
            dims in proptest::collection::vec(1u32..512, 0..=4),
            offset in any::<u32>(),
        ) {
            let mut d = TensorDescriptor::new(dtype, Shape::from_vec(dims));
            d.offset = offset;
            let mut buf = [0xAAu8; TensorDescriptor::RECORD_BYTES];
            d.encode_into(&mut buf).unwrap();
            prop_assert_eq!(TensorDescriptor::decode(&buf).unwrap(), d);
        }
    }
}
