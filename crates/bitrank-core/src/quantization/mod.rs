//! Sign-based binary quantization.
//!
//! Each embedding component becomes one bit: `1` if the value is strictly
//! positive, `0` otherwise (including `-0.0` and NaN).
//!
//! ## Footprint
//!
//! | Dimension | f32 | Binary |
//! |-----------|-----|--------|
//! | 384 | 1536 bytes | 48 bytes |
//! | 768 | 3072 bytes | 96 bytes |
//!
//! Binary codes are only an ordering pre-filter; scores shown to callers
//! always come from the full-precision rerank.

mod binary;

pub use binary::{BinaryCode, BinaryQuantizer};
