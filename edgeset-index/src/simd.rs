//! # SIMD Dot Product
//!
//! Fixed-width integer dot product over feature bytes, the inner loop of the
//! distance matrix (`N(N+1)/2` calls per recompute).
//!
//! ## Implementation Strategy
//! 1. Detect CPU features at runtime
//! 2. Dispatch to fastest available: AVX2 > Scalar (x86_64), NEON (aarch64)
//!
//! Every path accumulates in `u32` with wrap-around, so results are bit-identical
//! whichever kernel runs.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// Pluggable dot-product primitive
pub type DotProductFn = fn(&[u8], &[u8]) -> u32;

/// Dot product of two byte vectors using the best available SIMD
///
/// # Panics
/// If `a` and `b` differ in length. The vector kernels load from both slices
/// using `a.len()`.
#[inline]
pub fn dot_product_u8(a: &[u8], b: &[u8]) -> u32 {
    assert_eq!(a.len(), b.len(), "dot product operands differ in length");

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { dot_product_u8_avx2(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { dot_product_u8_neon(a, b) };
    }

    #[allow(unreachable_code)]
    dot_product_u8_scalar(a, b)
}

/// Portable reference kernel
#[inline]
pub fn dot_product_u8_scalar(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .fold(0u32, |acc, (&x, &y)| acc.wrapping_add(x as u32 * y as u32))
}

/// Name of the kernel `dot_product_u8` dispatches to on this CPU
pub fn active_kernel() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return "avx2";
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return "neon";
    }

    #[allow(unreachable_code)]
    "scalar"
}

// ============================================================================
// AVX2 implementation (32 bytes at a time)
// ============================================================================

/// Caller guarantees `a.len() == b.len()`
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dot_product_u8_avx2(a: &[u8], b: &[u8]) -> u32 {
    let n = a.len();
    let chunks = n / 32;
    let remainder = n % 32;

    let mut sum = _mm256_setzero_si256();

    let a_ptr = a.as_ptr() as *const __m256i;
    let b_ptr = b.as_ptr() as *const __m256i;

    for i in 0..chunks {
        let va = _mm256_loadu_si256(a_ptr.add(i));
        let vb = _mm256_loadu_si256(b_ptr.add(i));

        // Zero-extend to i16; 255 * 255 * 2 still fits the i32 lanes of madd
        let va_lo = _mm256_cvtepu8_epi16(_mm256_castsi256_si128(va));
        let vb_lo = _mm256_cvtepu8_epi16(_mm256_castsi256_si128(vb));
        let va_hi = _mm256_cvtepu8_epi16(_mm256_extracti128_si256(va, 1));
        let vb_hi = _mm256_cvtepu8_epi16(_mm256_extracti128_si256(vb, 1));

        sum = _mm256_add_epi32(sum, _mm256_madd_epi16(va_lo, vb_lo));
        sum = _mm256_add_epi32(sum, _mm256_madd_epi16(va_hi, vb_hi));
    }

    let mut result = hsum256_epi32(sum);

    let base = chunks * 32;
    for i in 0..remainder {
        result = result.wrapping_add(a[base + i] as u32 * b[base + i] as u32);
    }

    result
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hsum256_epi32(v: __m256i) -> u32 {
    let high = _mm256_extracti128_si256(v, 1);
    let low = _mm256_castsi256_si128(v);
    let sum128 = _mm_add_epi32(high, low);

    let shuf = _mm_shuffle_epi32(sum128, 0b11_10_11_10);
    let sums = _mm_add_epi32(sum128, shuf);
    let shuf = _mm_shuffle_epi32(sums, 0b00_00_00_01);
    let sums = _mm_add_epi32(sums, shuf);

    _mm_cvtsi128_si32(sums) as u32
}

// ============================================================================
// ARM NEON implementation (16 bytes at a time)
// ============================================================================

/// Caller guarantees `a.len() == b.len()`
#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn dot_product_u8_neon(a: &[u8], b: &[u8]) -> u32 {
    let n = a.len();
    let chunks = n / 16;
    let remainder = n % 16;

    let mut sum = vdupq_n_u32(0);

    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 16;
        let va = vld1q_u8(a_ptr.add(offset));
        let vb = vld1q_u8(b_ptr.add(offset));

        // u8 * u8 fits u16; pairwise-add into the u32 lanes
        let prod_lo = vmull_u8(vget_low_u8(va), vget_low_u8(vb));
        let prod_hi = vmull_high_u8(va, vb);
        sum = vpadalq_u16(sum, prod_lo);
        sum = vpadalq_u16(sum, prod_hi);
    }

    let mut result = vaddvq_u32(sum);

    let base = chunks * 16;
    for i in 0..remainder {
        result = result.wrapping_add(a[base + i] as u32 * b[base + i] as u32);
    }

    result
}
