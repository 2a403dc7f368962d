// Distance kernels for the similarity index.
// Runtime feature detection picks AVX2/FMA on x86_64 and NEON on aarch64,
// everything else goes through the unrolled scalar path.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

// Below this width the scalar loop wins over the SIMD setup cost.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
const MIN_DIM_SIZE_SIMD: usize = 16;

/// Squared Euclidean distance between two equal-length slices.
///
/// Mismatched lengths yield `f32::INFINITY` so a malformed row can never
/// outrank a well-formed one.
#[inline]
pub fn l2_squared_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
            && a.len() >= MIN_DIM_SIZE_SIMD
        {
            return unsafe { l2_squared_avx2(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") && a.len() >= MIN_DIM_SIZE_SIMD {
            return unsafe { l2_squared_neon(a, b) };
        }
    }

    l2_squared_scalar(a, b)
}

/// Dot product of two equal-length slices, 0.0 on mismatch.
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
            && a.len() >= MIN_DIM_SIZE_SIMD
        {
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    dot_product_scalar(a, b)
}

/// Euclidean norm.
#[inline]
pub fn norm_simd(v: &[f32]) -> f32 {
    dot_product_simd(v, v).sqrt()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn horizontal_sum_avx2(v: __m256) -> f32 {
    let high = _mm256_extractf128_ps(v, 1);
    let low = _mm256_castps256_ps128(v);
    let mut sum = _mm_add_ps(high, low);
    sum = _mm_hadd_ps(sum, sum);
    sum = _mm_hadd_ps(sum, sum);
    _mm_cvtss_f32(sum)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn l2_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;
    let mut acc1 = _mm256_setzero_ps();
    let mut acc2 = _mm256_setzero_ps();

    while i + 16 <= dim {
        let d1 = _mm256_sub_ps(
            _mm256_loadu_ps(a.as_ptr().add(i)),
            _mm256_loadu_ps(b.as_ptr().add(i)),
        );
        let d2 = _mm256_sub_ps(
            _mm256_loadu_ps(a.as_ptr().add(i + 8)),
            _mm256_loadu_ps(b.as_ptr().add(i + 8)),
        );
        acc1 = _mm256_fmadd_ps(d1, d1, acc1);
        acc2 = _mm256_fmadd_ps(d2, d2, acc2);
        i += 16;
    }

    let mut total = horizontal_sum_avx2(_mm256_add_ps(acc1, acc2));
    while i < dim {
        let d = a[i] - b[i];
        total += d * d;
        i += 1;
    }
    total
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;
    let mut acc1 = _mm256_setzero_ps();
    let mut acc2 = _mm256_setzero_ps();

    while i + 16 <= dim {
        acc1 = _mm256_fmadd_ps(
            _mm256_loadu_ps(a.as_ptr().add(i)),
            _mm256_loadu_ps(b.as_ptr().add(i)),
            acc1,
        );
        acc2 = _mm256_fmadd_ps(
            _mm256_loadu_ps(a.as_ptr().add(i + 8)),
            _mm256_loadu_ps(b.as_ptr().add(i + 8)),
            acc2,
        );
        i += 16;
    }

    let mut total = horizontal_sum_avx2(_mm256_add_ps(acc1, acc2));
    while i < dim {
        total += a[i] * b[i];
        i += 1;
    }
    total
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
unsafe fn l2_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;
    let mut acc1 = vdupq_n_f32(0.0);
    let mut acc2 = vdupq_n_f32(0.0);

    while i + 8 <= dim {
        let d1 = vsubq_f32(vld1q_f32(a.as_ptr().add(i)), vld1q_f32(b.as_ptr().add(i)));
        let d2 = vsubq_f32(vld1q_f32(a.as_ptr().add(i + 4)), vld1q_f32(b.as_ptr().add(i + 4)));
        acc1 = vfmaq_f32(acc1, d1, d1);
        acc2 = vfmaq_f32(acc2, d2, d2);
        i += 8;
    }

    let mut total = vaddvq_f32(vaddq_f32(acc1, acc2));
    while i < dim {
        let d = a[i] - b[i];
        total += d * d;
        i += 1;
    }
    total
}

#[inline]
fn l2_squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;

    let chunks = a.chunks_exact(4);
    let tail = chunks.remainder().len();
    for (x, y) in chunks.zip(b.chunks_exact(4)) {
        let d0 = x[0] - y[0];
        let d1 = x[1] - y[1];
        let d2 = x[2] - y[2];
        let d3 = x[3] - y[3];
        sum0 += d0 * d0 + d1 * d1;
        sum1 += d2 * d2 + d3 * d3;
    }

    for i in (a.len() - tail)..a.len() {
        let d = a[i] - b[i];
        sum0 += d * d;
    }

    sum0 + sum1
}

#[inline]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut dot0 = 0.0f32;
    let mut dot1 = 0.0f32;

    let chunks = a.chunks_exact(4);
    let tail = chunks.remainder().len();
    for (x, y) in chunks.zip(b.chunks_exact(4)) {
        dot0 += x[0] * y[0] + x[1] * y[1];
        dot1 += x[2] * y[2] + x[3] * y[3];
    }

    for i in (a.len() - tail)..a.len() {
        dot0 += a[i] * b[i];
    }

    dot0 + dot1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared_matches_scalar_on_wide_vectors() {
        let a: Vec<f32> = (0..67).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..67).map(|i| (67 - i) as f32 * 0.25).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
        let got = l2_squared_simd(&a, &b);
        assert!((got - expected).abs() / expected < 1e-5);
    }

    #[test]
    fn test_l2_squared_small() {
        assert_eq!(l2_squared_simd(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared_simd(&[1.0], &[1.0, 2.0]), f32::INFINITY);
    }

    #[test]
    fn test_dot_and_norm() {
        let v: Vec<f32> = vec![3.0; 32];
        assert!((dot_product_simd(&v, &v) - 288.0).abs() < 1e-3);
        assert!((norm_simd(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }
}
