//! Binary codes and the sign quantizer.

use serde::{Deserialize, Serialize};

use crate::distance::{hamming_packed, tail_mask};
use crate::error::{Error, Result};

/// A packed binary code, one bit per dimension, most-significant-bit first.
///
/// Padding bits of the final byte are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBinaryCode")]
pub struct BinaryCode {
    bytes: Box<[u8]>,
    dimension: usize,
}

/// Unchecked wire form; decoding goes through [`BinaryCode::from_packed`].
#[derive(Deserialize)]
struct RawBinaryCode {
    bytes: Box<[u8]>,
    dimension: usize,
}

impl TryFrom<RawBinaryCode> for BinaryCode {
    type Error = Error;

    fn try_from(raw: RawBinaryCode) -> Result<Self> {
        Self::from_packed(raw.bytes, raw.dimension)
    }
}

impl BinaryCode {
    /// Wraps already-packed bytes.
    ///
    /// Padding bits are cleared so that equal codes compare equal.
    ///
    /// # Errors
    ///
    /// Returns `CodeLengthMismatch` if `bytes.len() != ceil(dimension / 8)`.
    pub fn from_packed(bytes: impl Into<Box<[u8]>>, dimension: usize) -> Result<Self> {
        let mut bytes = bytes.into();
        let expected = dimension.div_ceil(8);
        if bytes.len() != expected {
            return Err(Error::CodeLengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        if let Some(last) = bytes.last_mut() {
            *last &= tail_mask(dimension);
        }
        Ok(Self { bytes, dimension })
    }

    /// Packed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of embedding components encoded.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Byte length of the packed code.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns bit `i` (component `i` was positive).
    ///
    /// Returns `None` if `i` is out of range.
    #[must_use]
    pub fn bit(&self, i: usize) -> Option<bool> {
        if i >= self.dimension {
            return None;
        }
        Some(self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Hamming distance to another code of the same dimension.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the dimensions differ.
    pub fn hamming_distance(&self, other: &Self) -> Result<u32> {
        if self.dimension != other.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: other.dimension,
            });
        }
        Ok(hamming_packed(
            &self.bytes,
            &other.bytes,
            tail_mask(self.dimension),
        ))
    }

    /// Consumes the code and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Box<[u8]> {
        self.bytes
    }
}

/// Deterministic float-to-binary quantizer for a fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryQuantizer {
    dimension: usize,
}

impl BinaryQuantizer {
    /// Creates a quantizer for embeddings of `dimension` components.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero dimension.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Configured dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Byte length of every code this quantizer produces.
    #[must_use]
    pub fn code_len(&self) -> usize {
        self.dimension.div_ceil(8)
    }

    /// Fails unless `embedding` has the configured dimension.
    pub fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Quantizes an embedding into a packed binary code.
    ///
    /// Bit `i` is `1` iff `embedding[i] > 0.0`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the embedding length is not the
    /// configured dimension. Embeddings are never truncated or padded.
    pub fn quantize(&self, embedding: &[f32]) -> Result<BinaryCode> {
        self.check_dimension(embedding)?;

        let mut bytes = vec![0_u8; self.code_len()];
        for (byte, chunk) in bytes.iter_mut().zip(embedding.chunks(8)) {
            for (bit, &value) in chunk.iter().enumerate() {
                if value > 0.0 {
                    *byte |= 0x80 >> bit;
                }
            }
        }

        Ok(BinaryCode {
            bytes: bytes.into_boxed_slice(),
            dimension: self.dimension,
        })
    }
}
