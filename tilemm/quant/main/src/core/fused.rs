//! Fused dequantize + matmul + activation.
//!
//! Output columns are processed in tiles of [`FUSED_TILE_COLS`]. The tiled
//! kernel transposes the input once per call, dequantizes a `K x tile`
//! weight panel into a pooled buffer and runs it through the dispatcher's
//! GEMM, so tile-aligned problems land on the outer-product kernels. The
//! elementwise kernel decodes each weight inline and is bound when no
//! vector stage is available.

use std::ops::Range;
use std::sync::OnceLock;
use std::time::Instant;

use tilemm_core::{parallel_threshold, require_len, DisjointMut, Element, PooledBuffer, WriteMode};
use tilemm_gemm::{dispatcher, Dispatcher, KernelEntry, Stage, STAGE_ORDER};
use tilemm_sched::{Parallelism, WorkQueue, WorkerPool};

use crate::api::types::{Activation, FusedInput, FusedTileFn, QuantizedWeights};

/// Output columns per fused tile; a multiple of every GEMM tile width.
pub const FUSED_TILE_COLS: usize = 64;

static ENGINE: OnceLock<FusedMatmul<'static>> = OnceLock::new();

/// The fused kernel bound for a dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct FusedKernels {
    pub matmul: KernelEntry<FusedTileFn>,
    /// `matmul` reads [`FusedInput::transposed`].
    pub transposed_input: bool,
}

impl FusedKernels {
    pub fn elementwise() -> Self {
        Self {
            matmul: KernelEntry::baseline("fused-elementwise", elementwise_tile as FusedTileFn),
            transposed_input: false,
        }
    }

    /// Walk the dispatcher's applied stages in order; the architecture
    /// stage swaps in the tiled kernel.
    pub fn bind(dispatcher: &Dispatcher) -> Self {
        let mut kernels = Self::elementwise();
        for stage in STAGE_ORDER {
            if !dispatcher.stages().contains(&stage) {
                continue;
            }
            if stage == Stage::Arch {
                kernels = Self {
                    matmul: KernelEntry::staged(stage, "fused-tiled", tiled_tile as FusedTileFn),
                    transposed_input: true,
                };
            }
        }
        kernels
    }
}

fn elementwise_tile(
    _dispatcher: &Dispatcher,
    input: &FusedInput<'_>,
    weights: &QuantizedWeights<'_>,
    cols: Range<usize>,
    activation: Activation,
    out: &mut [f32],
) {
    let (k, width) = (weights.k(), cols.len());
    if width == 0 {
        return;
    }
    for (i, row) in out.chunks_exact_mut(width).take(input.rows).enumerate() {
        let x = &input.data[i * k..(i + 1) * k];
        for (j, o) in row.iter_mut().enumerate() {
            let col = cols.start + j;
            let mut acc = 0.0f32;
            for (kk, &xv) in x.iter().enumerate() {
                acc += xv * weights.weight(kk, col);
            }
            *o = activation.apply(acc);
        }
    }
}

fn tiled_tile(
    dispatcher: &Dispatcher,
    input: &FusedInput<'_>,
    weights: &QuantizedWeights<'_>,
    cols: Range<usize>,
    activation: Activation,
    out: &mut [f32],
) {
    let (m, k, width) = (input.rows, weights.k(), cols.len());
    let mut panel = f32::pool().checkout(k * width);
    weights.dequantize_columns(cols, &mut panel);
    let dims = (m, width, k);
    let mode = WriteMode::Overwrite;
    dispatcher.matmul_transposed_lhs(input.transposed, &panel, out, dims, width, width, mode);
    activation.apply_slice(&mut out[..m * width]);
}

#[track_caller]
fn check_fused(input: usize, out: usize, m: usize, k: usize, n: usize) {
    require_len("input", input, m.checked_mul(k).unwrap_or(usize::MAX));
    require_len("out", out, m.checked_mul(n).unwrap_or(usize::MAX));
}

/// Fused quantized matmul bound to one dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct FusedMatmul<'d> {
    dispatcher: &'d Dispatcher,
    kernels: FusedKernels,
}

impl<'d> FusedMatmul<'d> {
    pub fn new(dispatcher: &'d Dispatcher) -> Self {
        Self::with_kernels(dispatcher, FusedKernels::bind(dispatcher))
    }

    pub fn with_kernels(dispatcher: &'d Dispatcher, kernels: FusedKernels) -> Self {
        Self { dispatcher, kernels }
    }

    pub fn kernels(&self) -> &FusedKernels {
        &self.kernels
    }

    fn transposed_input(
        &self,
        input: &[f32],
        m: usize,
        k: usize,
    ) -> Option<PooledBuffer<'static, f32>> {
        if !self.kernels.transposed_input {
            return None;
        }
        let mut at = f32::pool().checkout(m * k);
        self.dispatcher.transpose(&input[..m * k], &mut at, m, k);
        Some(at)
    }

    /// `out = activation(input x dequant(weights))` with `input: m x K` and
    /// `out: m x N`, both row-major.
    #[track_caller]
    pub fn fused_matmul(
        &self,
        input: &[f32],
        weights: &QuantizedWeights<'_>,
        out: &mut [f32],
        m: usize,
        activation: Activation,
    ) {
        let (k, n) = (weights.k(), weights.n());
        check_fused(input.len(), out.len(), m, k, n);
        if m == 0 || n == 0 {
            return;
        }
        let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };

        let at = self.transposed_input(input, m, k);
        let operand = FusedInput {
            rows: m,
            data: &input[..m * k],
            transposed: at.as_deref().unwrap_or(&[]),
        };
        let mut scratch = f32::pool().checkout(m * FUSED_TILE_COLS.min(n));
        for start in (0..n).step_by(FUSED_TILE_COLS) {
            let cols = start..(start + FUSED_TILE_COLS).min(n);
            let width = cols.len();
            let tile = &mut scratch[..m * width];
            let kernel = self.kernels.matmul.func;
            kernel(self.dispatcher, &operand, weights, cols.clone(), activation, tile);
            for (i, row) in tile.chunks_exact(width).enumerate() {
                out[i * n + cols.start..i * n + cols.end].copy_from_slice(row);
            }
        }

        if let Some(t) = _t {
            log::trace!(
                "[perf] quant::fused_matmul<{}> [{}x{}]x[{}x{}] {} via {} {:.3}ms",
                weights.scheme(),
                m,
                k,
                k,
                n,
                activation,
                self.kernels.matmul.name,
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    /// `out = silu(input x gate) * (input x up)` with independently
    /// quantized projections of the same shape.
    #[track_caller]
    pub fn fused_swiglu(
        &self,
        input: &[f32],
        gate: &QuantizedWeights<'_>,
        up: &QuantizedWeights<'_>,
        out: &mut [f32],
        m: usize,
    ) {
        assert!(
            gate.k() == up.k() && gate.n() == up.n(),
            "gate {}x{} and up {}x{} projections differ in shape",
            gate.k(),
            gate.n(),
            up.k(),
            up.n()
        );
        let n = gate.n();
        check_fused(input.len(), out.len(), m, gate.k(), n);

        let mut gated = f32::pool().checkout(m * n);
        self.fused_matmul(input, gate, &mut gated, m, Activation::Silu);
        self.fused_matmul(input, up, out, m, Activation::Identity);
        for (o, &g) in out[..m * n].iter_mut().zip(gated.iter()) {
            *o *= g;
        }
    }

    /// [`fused_matmul`](Self::fused_matmul) with output column tiles spread
    /// over `pool`. The transposed input is built once and shared.
    #[track_caller]
    pub fn parallel_fused_matmul(
        &self,
        pool: &WorkerPool,
        input: &[f32],
        weights: &QuantizedWeights<'_>,
        out: &mut [f32],
        m: usize,
        activation: Activation,
    ) {
        let (k, n) = (weights.k(), weights.n());
        check_fused(input.len(), out.len(), m, k, n);
        let work = m.saturating_mul(n).saturating_mul(k.max(1));
        let serial = pool.parallelism() == Parallelism::Disabled
            || work < parallel_threshold()
            || n <= FUSED_TILE_COLS;
        if serial {
            log::debug!("[fused] {}x{}x{} below parallel threshold or one tile; serial", m, n, k);
            self.fused_matmul(input, weights, out, m, activation);
            return;
        }
        let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };

        let at = self.transposed_input(input, m, k);
        let operand = FusedInput {
            rows: m,
            data: &input[..m * k],
            transposed: at.as_deref().unwrap_or(&[]),
        };
        let mut queue = WorkQueue::new();
        for start in (0..n).step_by(FUSED_TILE_COLS) {
            queue.push(start..(start + FUSED_TILE_COLS).min(n));
        }
        let dst = DisjointMut::new(&mut out[..m * n]);

        let workers = pool.saturate(queue.close(), |cols: Range<usize>| {
            let width = cols.len();
            let mut tile = f32::pool().checkout(m * width);
            let kernel = self.kernels.matmul.func;
            kernel(self.dispatcher, &operand, weights, cols.clone(), activation, &mut tile);
            for (i, row) in tile.chunks_exact(width).enumerate() {
                // Column tiles are disjoint across work items.
                let dst_row = unsafe { dst.slice_mut(i * n + cols.start, width) };
                dst_row.copy_from_slice(row);
            }
        });

        if let Some(t) = _t {
            log::trace!(
                "[perf] quant::parallel_fused<{}> [{}x{}]x[{}x{}] {} workers={} via {} {:.3}ms",
                weights.scheme(),
                m,
                k,
                k,
                n,
                activation,
                workers,
                self.kernels.matmul.name,
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
    }
}

/// The engine over the process-wide dispatcher, bound on first use.
pub(crate) fn engine() -> &'static FusedMatmul<'static> {
    ENGINE.get_or_init(|| {
        let engine = FusedMatmul::new(dispatcher());
        log::debug!("[fused] bound {:?}", engine.kernels.matmul);
        engine
    })
}

/// [`FusedMatmul::fused_matmul`] on the process-wide engine.
#[track_caller]
pub fn fused_matmul(
    input: &[f32],
    weights: &QuantizedWeights<'_>,
    out: &mut [f32],
    m: usize,
    activation: Activation,
) {
    engine().fused_matmul(input, weights, out, m, activation);
}

/// [`FusedMatmul::fused_swiglu`] on the process-wide engine.
#[track_caller]
pub fn fused_swiglu(
    input: &[f32],
    gate: &QuantizedWeights<'_>,
    up: &QuantizedWeights<'_>,
    out: &mut [f32],
    m: usize,
) {
    engine().fused_swiglu(input, gate, up, out, m);
}

/// [`FusedMatmul::parallel_fused_matmul`] on the process-wide engine and a
/// pool sized from the runtime configuration.
#[track_caller]
pub fn parallel_fused_matmul(
    input: &[f32],
    weights: &QuantizedWeights<'_>,
    out: &mut [f32],
    m: usize,
    activation: Activation,
) {
    let pool = WorkerPool::from_config();
    engine().parallel_fused_matmul(&pool, input, weights, out, m, activation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::QuantScheme;
    use crate::core::dequant::dequantize;
    use crate::core::quantize::quantize;
    use tilemm_core::Capabilities;

    fn data(len: usize, seed: usize) -> Vec<f32> {
        (0..len).map(|i| (((i + seed) * 2654435761) % 1000) as f32 / 500.0 - 1.0).collect()
    }

    fn reference(
        input: &[f32],
        weights: &QuantizedWeights<'_>,
        m: usize,
        activation: Activation,
    ) -> Vec<f32> {
        let dense = dequantize(weights);
        let mut out = vec![0.0f32; m * weights.n()];
        Dispatcher::scalar().matmul(input, &dense, &mut out, m, weights.n(), weights.k());
        activation.apply_slice(&mut out);
        out
    }

    fn assert_close(got: &[f32], expected: &[f32], k: usize) {
        let tol = 1e-4 * k.max(1) as f32;
        for (i, (a, b)) in got.iter().zip(expected).enumerate() {
            assert!((a - b).abs() <= tol, "element {}: {} vs {}", i, a, b);
        }
    }

    fn engines(d: &Dispatcher) -> [FusedMatmul<'_>; 2] {
        [
            FusedMatmul::with_kernels(d, FusedKernels::elementwise()),
            FusedMatmul::with_kernels(
                d,
                FusedKernels {
                    matmul: KernelEntry::staged(
                        Stage::Arch,
                        "fused-tiled",
                        tiled_tile as FusedTileFn,
                    ),
                    transposed_input: true,
                },
            ),
        ]
    }

    #[test]
    fn test_int4_0xf0_scenario() {
        let packed = [0xF0u8];
        let scales = [1.0f32];
        let w = QuantizedWeights::new(QuantScheme::Int4, &packed, &scales, 1, 2, 2).unwrap();
        let d = Dispatcher::detect();
        for engine in engines(&d) {
            let mut out = [0.0f32; 2];
            engine.fused_matmul(&[1.0], &w, &mut out, 1, Activation::Identity);
            assert_eq!(out, [-8.0, 7.0], "{}", engine.kernels().matmul.name);
        }
    }

    #[test]
    fn test_kernels_match_reference() {
        let d = Dispatcher::detect();
        let activations = [
            Activation::Identity,
            Activation::Silu,
            Activation::Gelu,
            Activation::GeluApprox,
            Activation::Relu,
        ];
        let shapes = [(1, 8, 3, 2), (5, 17, 70, 32), (32, 64, 128, 64), (33, 40, 130, 16)];
        for &(m, k, n, group) in &shapes {
            for scheme in [QuantScheme::Nf4, QuantScheme::Int4, QuantScheme::Int8] {
                let q = quantize(scheme, &data(k * n, 1), k, n, group).unwrap();
                let w = q.view();
                let input = data(m * k, 7);
                for activation in activations {
                    let expected = reference(&input, &w, m, activation);
                    for engine in engines(&d) {
                        let mut out = vec![f32::NAN; m * n];
                        engine.fused_matmul(&input, &w, &mut out, m, activation);
                        assert_close(&out, &expected, k);
                    }
                }
            }
        }
    }

    #[test]
    fn test_relu_output_non_negative() {
        let (m, k, n) = (4, 16, 20);
        let q = quantize(QuantScheme::Int8, &data(k * n, 3), k, n, 4).unwrap();
        let mut out = vec![0.0f32; m * n];
        fused_matmul(&data(m * k, 5), &q.view(), &mut out, m, Activation::Relu);
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_swiglu() {
        let (m, k, n) = (3, 24, 90);
        let gate = quantize(QuantScheme::Nf4, &data(k * n, 11), k, n, 32).unwrap();
        let up = quantize(QuantScheme::Int4, &data(k * n, 13), k, n, 32).unwrap();
        let input = data(m * k, 17);
        let g = reference(&input, &gate.view(), m, Activation::Silu);
        let u = reference(&input, &up.view(), m, Activation::Identity);
        let expected: Vec<f32> = g.iter().zip(&u).map(|(a, b)| a * b).collect();

        let mut out = vec![0.0f32; m * n];
        fused_swiglu(&input, &gate.view(), &up.view(), &mut out, m);
        assert_close(&out, &expected, k);
    }

    #[test]
    #[should_panic(expected = "projections differ")]
    fn test_swiglu_shape_mismatch() {
        let gate = quantize(QuantScheme::Int8, &data(8, 0), 2, 4, 4).unwrap();
        let up = quantize(QuantScheme::Int8, &data(8, 0), 4, 2, 2).unwrap();
        let mut out = vec![0.0f32; 4];
        fused_swiglu(&[1.0, 1.0], &gate.view(), &up.view(), &mut out, 1);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let (m, k, n) = (64, 64, 200);
        let q = quantize(QuantScheme::Int4, &data(k * n, 2), k, n, 32).unwrap();
        let input = data(m * k, 9);
        let d = Dispatcher::detect();
        let engine = FusedMatmul::new(&d);
        let mut serial = vec![0.0f32; m * n];
        engine.fused_matmul(&input, &q.view(), &mut serial, m, Activation::Gelu);
        for limit in [1, 3, -1] {
            let pool = WorkerPool::new(Parallelism::from(limit));
            let mut parallel = vec![f32::NAN; m * n];
            let gelu = Activation::Gelu;
            engine.parallel_fused_matmul(&pool, &input, &q.view(), &mut parallel, m, gelu);
            assert_eq!(serial, parallel, "limit {}", limit);
        }
    }

    #[test]
    #[should_panic(expected = "out buffer too small")]
    fn test_short_output_panics() {
        let q = quantize(QuantScheme::Int8, &data(8, 0), 2, 4, 4).unwrap();
        let mut out = vec![0.0f32; 3];
        fused_matmul(&[1.0, 1.0], &q.view(), &mut out, 1, Activation::Identity);
    }

    #[test]
    fn test_bind_follows_stages() {
        assert_eq!(FusedKernels::bind(&Dispatcher::scalar()).matmul.name, "fused-elementwise");
        let portable = Dispatcher::with_capabilities(Capabilities::none(), false);
        assert_eq!(FusedKernels::bind(&portable).matmul.name, "fused-elementwise");

        #[cfg(target_arch = "x86_64")]
        let (native, foreign) = (
            Capabilities { avx2: true, fma: true, ..Capabilities::none() },
            Capabilities { neon: true, ..Capabilities::none() },
        );
        #[cfg(target_arch = "aarch64")]
        let (native, foreign) = (
            Capabilities { neon: true, ..Capabilities::none() },
            Capabilities { avx2: true, fma: true, ..Capabilities::none() },
        );
        #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
        {
            let kernels = FusedKernels::bind(&Dispatcher::with_capabilities(native, false));
            assert_eq!(kernels.matmul.name, "fused-tiled");
            assert_eq!(kernels.matmul.stage, Some(Stage::Arch));
            assert!(kernels.transposed_input);

            // No vector kernels were bound for the other architecture.
            let kernels = FusedKernels::bind(&Dispatcher::with_capabilities(foreign, false));
            assert_eq!(kernels.matmul.name, "fused-elementwise");
            assert!(!kernels.transposed_input);
        }
    }

    #[test]
    fn test_free_functions_share_one_binding() {
        assert!(std::ptr::eq(engine(), engine()));
        assert_eq!(engine().kernels().matmul.name, FusedKernels::bind(dispatcher()).matmul.name);
    }
}
