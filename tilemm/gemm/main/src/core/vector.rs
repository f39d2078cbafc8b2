//! Vector kernels written once against [`SimdVector`] and instantiated per
//! ISA by the architecture wrappers.

use tilemm_core::{Element, SimdVector, WriteMode};

use crate::api::types::GemmCall;
use crate::core::scalar;

const UNROLL: usize = 4;

#[inline(always)]
unsafe fn store_with<V: SimdVector>(acc: V, dst: *mut V::Elem, mode: WriteMode) {
    match mode {
        WriteMode::Overwrite => acc.store(dst),
        WriteMode::Accumulate => V::add(V::load(dst), acc).store(dst),
    }
}

/// Row-by-row GEMM vectorized along `n`: each output strip stays in
/// registers for the whole reduction. Requires `b_cs == 1`.
#[inline(always)]
pub(crate) unsafe fn gemm<V: SimdVector>(call: &GemmCall<V::Elem>) {
    debug_assert_eq!(call.b_cs, 1);
    let lanes = V::LANES;
    let wide = lanes * UNROLL;

    for i in 0..call.m {
        let a_row = call.a.add(i * call.a_rs);
        let c_row = call.c.add(i * call.ldc);

        let mut j = 0;
        while j + wide <= call.n {
            let mut acc = [V::zero(); UNROLL];
            for p in 0..call.k {
                let av = V::splat(*a_row.add(p * call.a_cs));
                let b_row = call.b.add(p * call.b_rs + j);
                for (u, slot) in acc.iter_mut().enumerate() {
                    *slot = V::mul_add(av, V::load(b_row.add(u * lanes)), *slot);
                }
            }
            for (u, &slot) in acc.iter().enumerate() {
                store_with(slot, c_row.add(j + u * lanes), call.mode);
            }
            j += wide;
        }

        while j + lanes <= call.n {
            let mut acc = V::zero();
            for p in 0..call.k {
                let av = V::splat(*a_row.add(p * call.a_cs));
                acc = V::mul_add(av, V::load(call.b.add(p * call.b_rs + j)), acc);
            }
            store_with(acc, c_row.add(j), call.mode);
            j += lanes;
        }

        while j < call.n {
            let mut acc = <V::Elem as Element>::ZERO;
            for p in 0..call.k {
                acc += *a_row.add(p * call.a_cs) * *call.b.add(p * call.b_rs + j);
            }
            scalar::write_back(c_row.add(j), acc, call.mode);
            j += 1;
        }
    }
}

/// Dot-product GEMM for operands contiguous along `k`.
/// Requires `a_cs == 1` and `b_rs == 1`.
#[inline(always)]
pub(crate) unsafe fn gemm_klast<V: SimdVector>(call: &GemmCall<V::Elem>) {
    debug_assert!(call.a_cs == 1 && call.b_rs == 1);
    for i in 0..call.m {
        let a_row = call.a.add(i * call.a_rs);
        let c_row = call.c.add(i * call.ldc);
        for j in 0..call.n {
            let b_col = call.b.add(j * call.b_cs);
            let sum = dot::<V>(a_row, b_col, call.k);
            scalar::write_back(c_row.add(j), sum, call.mode);
        }
    }
}

#[inline(always)]
unsafe fn dot<V: SimdVector>(a: *const V::Elem, b: *const V::Elem, len: usize) -> V::Elem {
    let lanes = V::LANES;
    let wide = lanes * UNROLL;
    let mut acc = [V::zero(); UNROLL];
    let mut p = 0;
    while p + wide <= len {
        for (u, slot) in acc.iter_mut().enumerate() {
            let off = p + u * lanes;
            *slot = V::mul_add(V::load(a.add(off)), V::load(b.add(off)), *slot);
        }
        p += wide;
    }
    let mut total = V::add(V::add(acc[0], acc[1]), V::add(acc[2], acc[3]));
    while p + lanes <= len {
        total = V::mul_add(V::load(a.add(p)), V::load(b.add(p)), total);
        p += lanes;
    }
    let mut sum = total.reduce_sum();
    while p < len {
        sum += *a.add(p) * *b.add(p);
        p += 1;
    }
    sum
}

/// Cache-blocked loop order over [`gemm`].
#[inline(always)]
pub(crate) unsafe fn blocked<V: SimdVector>(call: &GemmCall<V::Elem>, block: usize) {
    let block = block.max(1);
    for i0 in (0..call.m).step_by(block) {
        let i1 = (i0 + block).min(call.m);
        for j0 in (0..call.n).step_by(block) {
            let j1 = (j0 + block).min(call.n);
            gemm::<V>(&call.sub(i0..i1, j0..j1));
        }
    }
}
