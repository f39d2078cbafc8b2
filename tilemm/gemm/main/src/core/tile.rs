//! Outer-product tile kernels.
//!
//! A `TILE x TILE` accumulator is held for the entire reduction: each step
//! loads one tile-width slice of the transposed left operand and one of the
//! right operand, and adds their outer product. The tile is written back to
//! `C` once, after the last step. `VPR` is the number of vectors per tile
//! row, so `VPR * V::LANES == TILE`.
//!
//! Entry points run inside a [`StreamingSession`]; the per-tile helpers
//! assume the caller already holds one.

use tilemm_core::{SimdVector, StreamingSession, WriteMode};

use crate::api::types::GemmCall;
use crate::core::vector;

#[inline(always)]
unsafe fn tile<V: SimdVector, const TILE: usize, const VPR: usize>(
    call: &GemmCall<V::Elem>,
    i0: usize,
    j0: usize,
) {
    let lanes = V::LANES;
    let mut acc = [[V::zero(); VPR]; TILE];

    for p in 0..call.k {
        let a_slice = call.a.add(p * call.a_cs + i0);
        let b_slice = call.b.add(p * call.b_rs + j0);
        let mut bv = [V::zero(); VPR];
        for (v, slot) in bv.iter_mut().enumerate() {
            *slot = V::load(b_slice.add(v * lanes));
        }
        for (r, row) in acc.iter_mut().enumerate() {
            let av = V::splat(*a_slice.add(r));
            for (slot, &b) in row.iter_mut().zip(bv.iter()) {
                *slot = V::mul_add(av, b, *slot);
            }
        }
    }

    for (r, row) in acc.iter().enumerate() {
        let dst = call.c.add((i0 + r) * call.ldc + j0);
        for (v, &slot) in row.iter().enumerate() {
            let out = dst.add(v * lanes);
            match call.mode {
                WriteMode::Overwrite => slot.store(out),
                WriteMode::Accumulate => V::add(V::load(out), slot).store(out),
            }
        }
    }
}

/// Tile GEMM over a fully tile-aligned problem.
///
/// Requires `a_rs == 1`, `b_cs == 1` and `m`, `n` multiples of `TILE`.
#[inline(always)]
pub(crate) unsafe fn gemm<V: SimdVector, const TILE: usize, const VPR: usize>(
    call: &GemmCall<V::Elem>,
) {
    debug_assert_eq!(VPR * V::LANES, TILE);
    debug_assert!(call.a_rs == 1 && call.b_cs == 1);
    debug_assert!(call.m % TILE == 0 && call.n % TILE == 0);

    let _session = StreamingSession::enter();
    for i0 in (0..call.m).step_by(TILE) {
        for j0 in (0..call.n).step_by(TILE) {
            tile::<V, TILE, VPR>(call, i0, j0);
        }
    }
}

/// Cache-blocked tile GEMM over any `m`, `n`.
///
/// The tile-aligned `m_t x n_t` corner is covered block by block with the
/// tile kernel; the right and bottom strips that do not fill a tile go to
/// the vector kernel. `block` is rounded up to a tile multiple. Requires
/// `a_rs == 1` and `b_cs == 1`.
#[inline(always)]
pub(crate) unsafe fn blocked<V: SimdVector, const TILE: usize, const VPR: usize>(
    call: &GemmCall<V::Elem>,
    block: usize,
) {
    debug_assert_eq!(VPR * V::LANES, TILE);
    debug_assert!(call.a_rs == 1 && call.b_cs == 1);

    let block = block.max(1).div_ceil(TILE) * TILE;
    let m_t = call.m / TILE * TILE;
    let n_t = call.n / TILE * TILE;

    if m_t > 0 && n_t > 0 {
        let _session = StreamingSession::enter();
        for i0 in (0..m_t).step_by(block) {
            let i1 = (i0 + block).min(m_t);
            for j0 in (0..n_t).step_by(block) {
                let j1 = (j0 + block).min(n_t);
                for ti in (i0..i1).step_by(TILE) {
                    for tj in (j0..j1).step_by(TILE) {
                        tile::<V, TILE, VPR>(call, ti, tj);
                    }
                }
            }
        }
    }

    if m_t > 0 && n_t < call.n {
        vector::gemm::<V>(&call.sub(0..m_t, n_t..call.n));
    }
    if m_t < call.m {
        vector::gemm::<V>(&call.sub(m_t..call.m, 0..call.n));
    }
}
