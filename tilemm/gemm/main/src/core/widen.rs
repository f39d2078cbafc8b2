//! Half-precision entry points.
//!
//! Operands are widened to f32 in pooled scratch, multiplied through the
//! f32 table and narrowed back; accumulation therefore happens in f32.

use half::slice::HalfFloatSliceExt;
use half::{bf16, f16};
use tilemm_core::{Element, MatMut, MatRef};

use crate::core::dispatch::{dispatcher, Dispatcher};

impl Dispatcher {
    #[track_caller]
    pub fn matmul_f16(
        &self,
        a: &[f16],
        b: &[f16],
        c: &mut [f16],
        m: usize,
        n: usize,
        k: usize,
    ) {
        self.matmul_widened(a, b, c, m, n, k);
    }

    #[track_caller]
    pub fn matmul_bf16(
        &self,
        a: &[bf16],
        b: &[bf16],
        c: &mut [bf16],
        m: usize,
        n: usize,
        k: usize,
    ) {
        self.matmul_widened(a, b, c, m, n, k);
    }

    #[track_caller]
    fn matmul_widened<H>(&self, a: &[H], b: &[H], c: &mut [H], m: usize, n: usize, k: usize)
    where
        [H]: HalfFloatSliceExt,
    {
        let a = MatRef::operand("lhs", a, m, k);
        let b = MatRef::operand("rhs", b, k, n);
        let mut c = MatMut::operand("out", c, m, n);

        let pool = f32::pool();
        let mut a32 = pool.checkout(a.len());
        let mut b32 = pool.checkout(b.len());
        let mut c32 = pool.checkout(m * n);
        a.as_slice().convert_to_f32_slice(&mut a32);
        b.as_slice().convert_to_f32_slice(&mut b32);

        self.matmul::<f32>(&a32, &b32, &mut c32, m, n, k);
        c.as_mut_slice().convert_from_f32_slice(&c32);
    }
}

/// `C = A x B` for IEEE half-precision operands.
#[track_caller]
pub fn matmul_f16(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize) {
    dispatcher().matmul_f16(a, b, c, m, n, k);
}

/// `C = A x B` for bfloat16 operands.
#[track_caller]
pub fn matmul_bf16(a: &[bf16], b: &[bf16], c: &mut [bf16], m: usize, n: usize, k: usize) {
    dispatcher().matmul_bf16(a, b, c, m, n, k);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f16_scenario() {
        let half = |v: &[f32]| -> Vec<f16> { v.iter().map(|&x| f16::from_f32(x)).collect() };
        let a = half(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = half(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let mut c = vec![f16::ZERO; 4];
        Dispatcher::detect().matmul_f16(&a, &b, &mut c, 2, 2, 3);
        let got: Vec<f32> = c.iter().map(|v| v.to_f32()).collect();
        assert_eq!(got, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_bf16_ones() {
        let n = 32;
        let a = vec![bf16::ONE; n * n];
        let mut c = vec![bf16::ZERO; n * n];
        Dispatcher::detect().matmul_bf16(&a, &a, &mut c, n, n, n);
        assert!(c.iter().all(|v| v.to_f32() == n as f32));
    }

    #[test]
    #[should_panic(expected = "out buffer too small: need 4 elements, got 3")]
    fn test_short_half_output_panics() {
        let a = vec![f16::ONE; 6];
        let mut c = vec![f16::ZERO; 3];
        Dispatcher::scalar().matmul_f16(&a, &a, &mut c, 2, 2, 3);
    }
}
