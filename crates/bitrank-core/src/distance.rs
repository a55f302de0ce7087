//! Distance and similarity kernels.
//!
//! Hamming distance works on packed codes and masks the padding bits of the
//! final byte. Cosine similarity is defined as `0.0` when either vector has
//! zero norm.

/// Bits of the final code byte that carry embedding components.
///
/// Codes are packed most-significant-bit first, so the valid bits of a
/// partial byte are the high ones.
#[inline]
#[must_use]
pub const fn tail_mask(dimension: usize) -> u8 {
    match dimension % 8 {
        0 => 0xFF,
        // `rem` is in 1..=7, so the shift stays in range.
        rem => 0xFF << (8 - rem),
    }
}

/// Hamming distance between two packed codes of equal length.
///
/// `tail_mask` is applied to the final byte so padding never counts.
///
/// # Panics
///
/// Debug builds panic if the slices differ in length.
#[inline]
#[must_use]
pub fn hamming_packed(a: &[u8], b: &[u8], tail_mask: u8) -> u32 {
    debug_assert_eq!(a.len(), b.len(), "Code lengths must match");

    let (Some((last_a, head_a)), Some((last_b, head_b))) = (a.split_last(), b.split_last()) else {
        return 0;
    };

    let mut words_a = head_a.chunks_exact(8);
    let mut words_b = head_b.chunks_exact(8);
    let mut total = 0_u32;

    for (wa, wb) in words_a.by_ref().zip(words_b.by_ref()) {
        total += (load_u64(wa) ^ load_u64(wb)).count_ones();
    }
    for (&x, &y) in words_a.remainder().iter().zip(words_b.remainder()) {
        total += (x ^ y).count_ones();
    }

    total + ((last_a ^ last_b) & tail_mask).count_ones()
}

#[inline]
fn load_u64(bytes: &[u8]) -> u64 {
    let mut word = [0_u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

/// Dot product with four independent accumulators.
///
/// Products are accumulated in `f64` so that large but finite components do
/// not overflow.
///
/// # Panics
///
/// Debug builds panic if the slices differ in length.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut acc = [0.0_f64; 4];
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let tail: f64 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        acc[0] += f64::from(ca[0]) * f64::from(cb[0]);
        acc[1] += f64::from(ca[1]) * f64::from(cb[1]);
        acc[2] += f64::from(ca[2]) * f64::from(cb[2]);
        acc[3] += f64::from(ca[3]) * f64::from(cb[3]);
    }

    (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn l2_norm(v: &[f32]) -> f64 {
    dot_product(v, v).sqrt()
}

/// Cosine similarity from a dot product and precomputed norms.
///
/// Returns `0.0` for zero-norm inputs and for non-finite results, and clamps
/// rounding overshoot into `[-1.0, 1.0]`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_from_parts(dot: f64, norm_a: f64, norm_b: f64) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / norm_a / norm_b;
    if cosine.is_finite() {
        cosine.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Cosine similarity between two vectors.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_from_parts(dot_product(a, b), l2_norm(a), l2_norm(b))
}
