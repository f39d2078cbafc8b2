//! Quantized weight layouts, activations and the fused kernel signature

use std::ops::Range;

use crate::api::error::{QuantError, QuantResult};
use tilemm_gemm::Dispatcher;

/// Encoding of the packed weight codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantScheme {
    /// 4-bit index into the normal-float table, two codes per byte.
    Nf4,
    /// 4-bit signed integer stored as `code - 8`, two codes per byte.
    Int4,
    /// 8-bit signed integer, one code per byte.
    Int8,
}

impl QuantScheme {
    pub fn bits(&self) -> usize {
        match self {
            QuantScheme::Nf4 | QuantScheme::Int4 => 4,
            QuantScheme::Int8 => 8,
        }
    }

    /// Bytes needed to hold `count` codes.
    pub fn packed_len(&self, count: usize) -> usize {
        match self.bits() {
            4 => count.div_ceil(2),
            _ => count,
        }
    }
}

impl std::fmt::Display for QuantScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantScheme::Nf4 => write!(f, "nf4"),
            QuantScheme::Int4 => write!(f, "int4"),
            QuantScheme::Int8 => write!(f, "int8"),
        }
    }
}

impl std::str::FromStr for QuantScheme {
    type Err = QuantError;

    fn from_str(s: &str) -> QuantResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nf4" => Ok(QuantScheme::Nf4),
            "int4" | "q4" => Ok(QuantScheme::Int4),
            "int8" | "q8" => Ok(QuantScheme::Int8),
            other => Err(QuantError::InvalidData(format!(
                "unknown quantization scheme {:?}",
                other
            ))),
        }
    }
}

/// Elementwise function applied to every fused matmul output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Identity,
    /// `x * sigmoid(x)`
    Silu,
    /// `0.5 * x * (1 + erf(x / sqrt(2)))`
    Gelu,
    /// `x * sigmoid(1.702 * x)`
    GeluApprox,
    Relu,
}

/// `rows * cols`, or a shape error when the product overflows `usize`.
pub(crate) fn element_count(
    what: &'static str,
    rows: usize,
    cols: usize,
    actual: usize,
) -> QuantResult<usize> {
    rows.checked_mul(cols).ok_or(QuantError::ShapeMismatch { what, expected: usize::MAX, actual })
}

/// Borrowed view of a `K x N` quantized weight matrix.
///
/// Code `idx = k * N + n` lives in byte `idx / 2` (4-bit schemes, low nibble
/// for even `idx`) or byte `idx` (Int8). Scales are stored row-major by `k`
/// then group: `scales[k * num_groups + n / group_size]`.
#[derive(Debug, Clone, Copy)]
pub struct QuantizedWeights<'a> {
    pub(crate) scheme: QuantScheme,
    pub(crate) packed: &'a [u8],
    pub(crate) scales: &'a [f32],
    pub(crate) k: usize,
    pub(crate) n: usize,
    pub(crate) group_size: usize,
}

impl<'a> QuantizedWeights<'a> {
    pub fn new(
        scheme: QuantScheme,
        packed: &'a [u8],
        scales: &'a [f32],
        k: usize,
        n: usize,
        group_size: usize,
    ) -> QuantResult<Self> {
        if group_size == 0 {
            return Err(QuantError::InvalidGroupSize(group_size));
        }
        let codes = element_count("packed weights", k, n, packed.len())?;
        let expected = scheme.packed_len(codes);
        if packed.len() < expected {
            return Err(QuantError::ShapeMismatch {
                what: "packed weights",
                expected,
                actual: packed.len(),
            });
        }
        let expected = element_count("scales", k, n.div_ceil(group_size), scales.len())?;
        if scales.len() < expected {
            return Err(QuantError::ShapeMismatch {
                what: "scales",
                expected,
                actual: scales.len(),
            });
        }
        Ok(Self { scheme, packed, scales, k, n, group_size })
    }

    pub fn scheme(&self) -> QuantScheme {
        self.scheme
    }

    /// Reduction dimension.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Output columns.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn num_groups(&self) -> usize {
        self.n.div_ceil(self.group_size)
    }

    pub fn packed(&self) -> &'a [u8] {
        self.packed
    }

    pub fn scales(&self) -> &'a [f32] {
        self.scales
    }
}

/// Owned quantized weights, as produced by the quantizers.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedWeights {
    pub scheme: QuantScheme,
    pub packed: Vec<u8>,
    pub scales: Vec<f32>,
    pub k: usize,
    pub n: usize,
    pub group_size: usize,
}

impl PackedWeights {
    pub fn view(&self) -> QuantizedWeights<'_> {
        QuantizedWeights {
            scheme: self.scheme,
            packed: &self.packed,
            scales: &self.scales,
            k: self.k,
            n: self.n,
            group_size: self.group_size,
        }
    }
}

/// Row-major `m x k` input, optionally with its `k x m` transpose.
#[derive(Debug, Clone, Copy)]
pub struct FusedInput<'a> {
    pub rows: usize,
    pub data: &'a [f32],
    /// Empty unless the bound kernel consumes the transposed input.
    pub transposed: &'a [f32],
}

/// Computes `act(input x dequant(w))` restricted to output columns `cols`
/// into a row-major `rows x cols.len()` buffer.
pub type FusedTileFn =
    fn(&Dispatcher, &FusedInput<'_>, &QuantizedWeights<'_>, Range<usize>, Activation, &mut [f32]);
