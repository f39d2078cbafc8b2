//! Transpose stage.
//!
//! Every form works on a range of source rows and writes the matching
//! columns of the destination, so workers can share one destination.
//! Size classes:
//! - fewer than [`SMALL_TRANSPOSE`] elements: scalar loop
//! - otherwise: `B x B` in-register block transposes, scalar edges
//! - [`HUGE_TRANSPOSE`] elements and up (tile-staged form only): blocks are
//!   visited in [`STAGE`]-square cache tiles

use std::ops::Range;

use crate::core::scalar;

pub const SMALL_TRANSPOSE: usize = 64 * 64;
pub const HUGE_TRANSPOSE: usize = 1024 * 1024;
pub const STAGE: usize = 64;

/// Transpose a `B x B` block: `src` with row stride `ls` into `dst` with
/// row stride `ld`.
pub(crate) trait BlockTranspose<T> {
    const B: usize;

    unsafe fn block(src: *const T, ls: usize, dst: *mut T, ld: usize);
}

/// Blocks over the region, scalar on the edges.
#[inline(always)]
unsafe fn region<T: Copy, K: BlockTranspose<T>>(
    src: *const T,
    dst: *mut T,
    rows: usize,
    cols: usize,
    row_range: Range<usize>,
    col_range: Range<usize>,
) {
    let b = K::B;
    let row_end = row_range.start + (row_range.len() / b) * b;
    let col_end = col_range.start + (col_range.len() / b) * b;

    for i in (row_range.start..row_end).step_by(b) {
        for j in (col_range.start..col_end).step_by(b) {
            K::block(src.add(i * cols + j), cols, dst.add(j * rows + i), rows);
        }
    }
    let (body, edge) = (row_range.start..row_end, col_end..col_range.end);
    scalar::transpose_region(src, dst, rows, cols, body, edge);
    scalar::transpose_region(src, dst, rows, cols, row_end..row_range.end, col_range);
}

/// Scalar below the small threshold, block transposes above it.
#[inline(always)]
pub(crate) unsafe fn blocked<T: Copy, K: BlockTranspose<T>>(
    src: *const T,
    dst: *mut T,
    rows: usize,
    cols: usize,
    range: Range<usize>,
) {
    if range.len() * cols < SMALL_TRANSPOSE {
        scalar::transpose_rows(src, dst, rows, cols, range);
    } else {
        region::<T, K>(src, dst, rows, cols, range, 0..cols);
    }
}

/// [`blocked`], visiting huge matrices in cache-sized stages.
#[inline(always)]
pub(crate) unsafe fn staged<T: Copy, K: BlockTranspose<T>>(
    src: *const T,
    dst: *mut T,
    rows: usize,
    cols: usize,
    range: Range<usize>,
) {
    if rows * cols < HUGE_TRANSPOSE {
        blocked::<T, K>(src, dst, rows, cols, range);
        return;
    }
    for i0 in range.clone().step_by(STAGE) {
        let i1 = (i0 + STAGE).min(range.end);
        for j0 in (0..cols).step_by(STAGE) {
            let j1 = (j0 + STAGE).min(cols);
            region::<T, K>(src, dst, rows, cols, i0..i1, j0..j1);
        }
    }
}

/// 8x8 block through a stack buffer; the compiler is free to vectorize it.
pub(crate) struct PortableBlock;

impl<T: Copy + Default> BlockTranspose<T> for PortableBlock {
    const B: usize = 8;

    #[inline(always)]
    unsafe fn block(src: *const T, ls: usize, dst: *mut T, ld: usize) {
        let mut buf = [[T::default(); 8]; 8];
        for (r, row) in buf.iter_mut().enumerate() {
            std::ptr::copy_nonoverlapping(src.add(r * ls), row.as_mut_ptr(), 8);
        }
        for c in 0..8 {
            let out = dst.add(c * ld);
            for (r, row) in buf.iter().enumerate() {
                *out.add(r) = row[c];
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) mod x86 {
    use super::BlockTranspose;
    use std::arch::x86_64::*;

    /// 8x8 f32 butterfly: unpack, shuffle, then swap 128-bit halves.
    pub(crate) struct Avx2F32;

    impl BlockTranspose<f32> for Avx2F32 {
        const B: usize = 8;

        #[inline(always)]
        unsafe fn block(src: *const f32, ls: usize, dst: *mut f32, ld: usize) {
            let r0 = _mm256_loadu_ps(src);
            let r1 = _mm256_loadu_ps(src.add(ls));
            let r2 = _mm256_loadu_ps(src.add(2 * ls));
            let r3 = _mm256_loadu_ps(src.add(3 * ls));
            let r4 = _mm256_loadu_ps(src.add(4 * ls));
            let r5 = _mm256_loadu_ps(src.add(5 * ls));
            let r6 = _mm256_loadu_ps(src.add(6 * ls));
            let r7 = _mm256_loadu_ps(src.add(7 * ls));

            let t0 = _mm256_unpacklo_ps(r0, r1);
            let t1 = _mm256_unpackhi_ps(r0, r1);
            let t2 = _mm256_unpacklo_ps(r2, r3);
            let t3 = _mm256_unpackhi_ps(r2, r3);
            let t4 = _mm256_unpacklo_ps(r4, r5);
            let t5 = _mm256_unpackhi_ps(r4, r5);
            let t6 = _mm256_unpacklo_ps(r6, r7);
            let t7 = _mm256_unpackhi_ps(r6, r7);

            let s0 = _mm256_shuffle_ps::<0x44>(t0, t2);
            let s1 = _mm256_shuffle_ps::<0xEE>(t0, t2);
            let s2 = _mm256_shuffle_ps::<0x44>(t1, t3);
            let s3 = _mm256_shuffle_ps::<0xEE>(t1, t3);
            let s4 = _mm256_shuffle_ps::<0x44>(t4, t6);
            let s5 = _mm256_shuffle_ps::<0xEE>(t4, t6);
            let s6 = _mm256_shuffle_ps::<0x44>(t5, t7);
            let s7 = _mm256_shuffle_ps::<0xEE>(t5, t7);

            _mm256_storeu_ps(dst, _mm256_permute2f128_ps::<0x20>(s0, s4));
            _mm256_storeu_ps(dst.add(ld), _mm256_permute2f128_ps::<0x20>(s1, s5));
            _mm256_storeu_ps(dst.add(2 * ld), _mm256_permute2f128_ps::<0x20>(s2, s6));
            _mm256_storeu_ps(dst.add(3 * ld), _mm256_permute2f128_ps::<0x20>(s3, s7));
            _mm256_storeu_ps(dst.add(4 * ld), _mm256_permute2f128_ps::<0x31>(s0, s4));
            _mm256_storeu_ps(dst.add(5 * ld), _mm256_permute2f128_ps::<0x31>(s1, s5));
            _mm256_storeu_ps(dst.add(6 * ld), _mm256_permute2f128_ps::<0x31>(s2, s6));
            _mm256_storeu_ps(dst.add(7 * ld), _mm256_permute2f128_ps::<0x31>(s3, s7));
        }
    }

    /// 4x4 f64 butterfly.
    pub(crate) struct Avx2F64;

    impl BlockTranspose<f64> for Avx2F64 {
        const B: usize = 4;

        #[inline(always)]
        unsafe fn block(src: *const f64, ls: usize, dst: *mut f64, ld: usize) {
            let r0 = _mm256_loadu_pd(src);
            let r1 = _mm256_loadu_pd(src.add(ls));
            let r2 = _mm256_loadu_pd(src.add(2 * ls));
            let r3 = _mm256_loadu_pd(src.add(3 * ls));

            let t0 = _mm256_unpacklo_pd(r0, r1);
            let t1 = _mm256_unpackhi_pd(r0, r1);
            let t2 = _mm256_unpacklo_pd(r2, r3);
            let t3 = _mm256_unpackhi_pd(r2, r3);

            _mm256_storeu_pd(dst, _mm256_permute2f128_pd::<0x20>(t0, t2));
            _mm256_storeu_pd(dst.add(ld), _mm256_permute2f128_pd::<0x20>(t1, t3));
            _mm256_storeu_pd(dst.add(2 * ld), _mm256_permute2f128_pd::<0x31>(t0, t2));
            _mm256_storeu_pd(dst.add(3 * ld), _mm256_permute2f128_pd::<0x31>(t1, t3));
        }
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) mod arm {
    use super::BlockTranspose;
    use std::arch::aarch64::*;

    /// 4x4 f32: 32-bit transposes, then 64-bit transposes.
    pub(crate) struct NeonF32;

    impl BlockTranspose<f32> for NeonF32 {
        const B: usize = 4;

        #[inline(always)]
        unsafe fn block(src: *const f32, ls: usize, dst: *mut f32, ld: usize) {
            let r0 = vld1q_f32(src);
            let r1 = vld1q_f32(src.add(ls));
            let r2 = vld1q_f32(src.add(2 * ls));
            let r3 = vld1q_f32(src.add(3 * ls));

            let t0 = vreinterpretq_f64_f32(vtrn1q_f32(r0, r1));
            let t1 = vreinterpretq_f64_f32(vtrn2q_f32(r0, r1));
            let t2 = vreinterpretq_f64_f32(vtrn1q_f32(r2, r3));
            let t3 = vreinterpretq_f64_f32(vtrn2q_f32(r2, r3));

            vst1q_f32(dst, vreinterpretq_f32_f64(vtrn1q_f64(t0, t2)));
            vst1q_f32(dst.add(ld), vreinterpretq_f32_f64(vtrn1q_f64(t1, t3)));
            vst1q_f32(dst.add(2 * ld), vreinterpretq_f32_f64(vtrn2q_f64(t0, t2)));
            vst1q_f32(dst.add(3 * ld), vreinterpretq_f32_f64(vtrn2q_f64(t1, t3)));
        }
    }

    /// 2x2 f64.
    pub(crate) struct NeonF64;

    impl BlockTranspose<f64> for NeonF64 {
        const B: usize = 2;

        #[inline(always)]
        unsafe fn block(src: *const f64, ls: usize, dst: *mut f64, ld: usize) {
            let r0 = vld1q_f64(src);
            let r1 = vld1q_f64(src.add(ls));
            vst1q_f64(dst, vtrn1q_f64(r0, r1));
            vst1q_f64(dst.add(ld), vtrn2q_f64(r0, r1));
        }
    }
}
