//! Scalar reference kernels: the correctness baseline and the universal
//! fallback when every vector path is disabled.

use std::ops::Range;

use tilemm_core::{Element, WriteMode};

use crate::api::types::GemmCall;

#[inline(always)]
pub(crate) unsafe fn write_back<T: Element>(dst: *mut T, value: T, mode: WriteMode) {
    match mode {
        WriteMode::Overwrite => *dst = value,
        WriteMode::Accumulate => *dst += value,
    }
}

/// Triple loop over any operand strides.
pub(crate) unsafe fn gemm<T: Element>(call: &GemmCall<T>) {
    for i in 0..call.m {
        let a_row = call.a.add(i * call.a_rs);
        let c_row = call.c.add(i * call.ldc);
        for j in 0..call.n {
            let b_col = call.b.add(j * call.b_cs);
            let mut acc = T::ZERO;
            for p in 0..call.k {
                acc += *a_row.add(p * call.a_cs) * *b_col.add(p * call.b_rs);
            }
            write_back(c_row.add(j), acc, call.mode);
        }
    }
}

/// Cache-blocked loop order over the scalar kernel.
pub(crate) unsafe fn blocked<T: Element>(call: &GemmCall<T>, block: usize) {
    let block = block.max(1);
    for i0 in (0..call.m).step_by(block) {
        let i1 = (i0 + block).min(call.m);
        for j0 in (0..call.n).step_by(block) {
            let j1 = (j0 + block).min(call.n);
            gemm(&call.sub(i0..i1, j0..j1));
        }
    }
}

/// Strided transpose of source rows `range`.
pub(crate) unsafe fn transpose_rows<T: Copy>(
    src: *const T,
    dst: *mut T,
    rows: usize,
    cols: usize,
    range: Range<usize>,
) {
    transpose_region(src, dst, rows, cols, range, 0..cols);
}

/// Transpose the `row_range x col_range` region of the source.
#[inline(always)]
pub(crate) unsafe fn transpose_region<T: Copy>(
    src: *const T,
    dst: *mut T,
    rows: usize,
    cols: usize,
    row_range: Range<usize>,
    col_range: Range<usize>,
) {
    for i in row_range {
        let src_row = src.add(i * cols);
        for j in col_range.clone() {
            *dst.add(j * rows + i) = *src_row.add(j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemm_2x3_by_3x2() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut c = [0.0f32; 4];
        let mode = WriteMode::Overwrite;
        let call = GemmCall::row_major(a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), 2, 2, 3, mode);
        unsafe { gemm(&call) };
        assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_gemm_k_last_layout() {
        let a = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        // B^T stored n x k.
        let bt = [7.0f64, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut c = [1.0f64; 4];
        let mode = WriteMode::Accumulate;
        let call = GemmCall::k_last(a.as_ptr(), bt.as_ptr(), c.as_mut_ptr(), 2, 2, 3, mode);
        unsafe { gemm(&call) };
        assert_eq!(c, [59.0, 65.0, 140.0, 155.0]);
    }

    #[test]
    fn test_blocked_matches_gemm() {
        let (m, n, k) = (13, 9, 7);
        let a: Vec<f64> = (0..m * k).map(|i| (i % 5) as f64 - 2.0).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 3) as f64 * 0.5).collect();
        let mut c1 = vec![0.0; m * n];
        let mut c2 = vec![0.0; m * n];
        let mode = WriteMode::Overwrite;
        unsafe {
            gemm(&GemmCall::row_major(a.as_ptr(), b.as_ptr(), c1.as_mut_ptr(), m, n, k, mode));
            let call = GemmCall::row_major(a.as_ptr(), b.as_ptr(), c2.as_mut_ptr(), m, n, k, mode);
            blocked(&call, 4);
        }
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_transpose_rows_partial() {
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0; 6];
        unsafe { transpose_rows(src.as_ptr(), dst.as_mut_ptr(), 2, 3, 1..2) };
        assert_eq!(dst, [0, 4, 0, 5, 0, 6]);
    }
}
