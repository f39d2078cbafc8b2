//! Absmax quantizers producing the packed layout consumed by the fused
//! kernels. Each `(k, group)` pair gets its own scale.

use rayon::prelude::*;
use std::time::Instant;

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::{element_count, PackedWeights, QuantScheme};
use crate::core::dequant::NF4_TABLE;

/// Quantize row-major `K x N` weights to 4-bit signed integers.
///
/// Scale is `absmax / 7`; codes are stored as `q + 8` in `[0, 15]`.
pub fn quantize_int4(
    weights: &[f32],
    k: usize,
    n: usize,
    group_size: usize,
) -> QuantResult<PackedWeights> {
    quantize(QuantScheme::Int4, weights, k, n, group_size)
}

/// Quantize row-major `K x N` weights to 8-bit signed integers with scale
/// `absmax / 127`.
pub fn quantize_int8(
    weights: &[f32],
    k: usize,
    n: usize,
    group_size: usize,
) -> QuantResult<PackedWeights> {
    quantize(QuantScheme::Int8, weights, k, n, group_size)
}

/// Quantize row-major `K x N` weights to the nearest NF4 table entry of
/// `w / absmax`.
pub fn quantize_nf4(
    weights: &[f32],
    k: usize,
    n: usize,
    group_size: usize,
) -> QuantResult<PackedWeights> {
    quantize(QuantScheme::Nf4, weights, k, n, group_size)
}

pub fn quantize(
    scheme: QuantScheme,
    weights: &[f32],
    k: usize,
    n: usize,
    group_size: usize,
) -> QuantResult<PackedWeights> {
    if group_size == 0 {
        return Err(QuantError::InvalidGroupSize(group_size));
    }
    let count = element_count("weights", k, n, weights.len())?;
    if weights.len() != count {
        return Err(QuantError::ShapeMismatch {
            what: "weights",
            expected: count,
            actual: weights.len(),
        });
    }
    if let Some(pos) = weights.iter().position(|v| !v.is_finite()) {
        return Err(QuantError::InvalidData(format!(
            "non-finite weight {} at ({}, {})",
            weights[pos],
            pos / n,
            pos % n
        )));
    }

    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let groups = n.div_ceil(group_size);
    let qmax = match scheme {
        QuantScheme::Int4 => 7.0,
        QuantScheme::Int8 => 127.0,
        QuantScheme::Nf4 => 1.0,
    };

    let mut scales = vec![0.0f32; k * groups];
    let mut codes = vec![0u8; count];
    if n > 0 {
        scales
            .par_chunks_mut(groups)
            .zip(codes.par_chunks_mut(n))
            .zip(weights.par_chunks(n))
            .for_each(|((row_scales, row_codes), row)| {
                for (g, scale) in row_scales.iter_mut().enumerate() {
                    let start = g * group_size;
                    let end = (start + group_size).min(n);
                    let amax = row[start..end].iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
                    *scale = amax / qmax;
                    let inv = if *scale == 0.0 { 0.0 } else { 1.0 / *scale };
                    for (code, &v) in row_codes[start..end].iter_mut().zip(&row[start..end]) {
                        *code = encode(scheme, v * inv);
                    }
                }
            });
    }

    let packed = match scheme.bits() {
        4 => {
            let mut packed = vec![0u8; scheme.packed_len(count)];
            for (idx, &code) in codes.iter().enumerate() {
                packed[idx / 2] |= if idx % 2 == 0 { code } else { code << 4 };
            }
            packed
        }
        _ => codes,
    };

    if let Some(t) = _t {
        log::trace!(
            "[perf] quant::quantize<{}> [{}x{}] group={} {:.3}ms",
            scheme,
            k,
            n,
            group_size,
            t.elapsed().as_secs_f64() * 1000.0
        );
    }

    Ok(PackedWeights { scheme, packed, scales, k, n, group_size })
}

/// Code for a value already divided by its scale.
#[inline]
fn encode(scheme: QuantScheme, x: f32) -> u8 {
    match scheme {
        QuantScheme::Int4 => (x.round().clamp(-8.0, 7.0) as i8 + 8) as u8,
        QuantScheme::Int8 => x.round().clamp(-128.0, 127.0) as i8 as u8,
        QuantScheme::Nf4 => nearest_nf4(x),
    }
}

fn nearest_nf4(x: f32) -> u8 {
    let mut best = 0;
    let mut best_err = f32::INFINITY;
    for (i, &level) in NF4_TABLE.iter().enumerate() {
        let err = (x - level).abs();
        if err < best_err {
            best = i;
            best_err = err;
        }
    }
    best as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dequant::dequantize;

    fn weights(k: usize, n: usize) -> Vec<f32> {
        (0..k * n).map(|i| ((i * 7919) % 201) as f32 / 100.0 - 1.0).collect()
    }

    fn max_err(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).fold(0.0f32, |acc, (x, y)| acc.max((x - y).abs()))
    }

    #[test]
    fn test_int8_roundtrip() {
        let w = weights(8, 64);
        let q = quantize_int8(&w, 8, 64, 32).unwrap();
        assert_eq!(q.packed.len(), 8 * 64);
        assert_eq!(q.scales.len(), 8 * 2);
        let back = dequantize(&q.view());
        assert!(max_err(&w, &back) < 0.01, "max err {}", max_err(&w, &back));
    }

    #[test]
    fn test_int4_roundtrip() {
        let w = weights(8, 64);
        let q = quantize_int4(&w, 8, 64, 16).unwrap();
        assert_eq!(q.packed.len(), 8 * 32);
        let back = dequantize(&q.view());
        // Half a step of absmax / 7.
        assert!(max_err(&w, &back) <= 1.0 / 14.0 + 1e-6, "max err {}", max_err(&w, &back));
    }

    #[test]
    fn test_nf4_roundtrip() {
        let w = weights(4, 33);
        let q = quantize_nf4(&w, 4, 33, 8).unwrap();
        assert_eq!(q.packed.len(), (4 * 33 + 1) / 2);
        assert_eq!(q.scales.len(), 4 * 5);
        let back = dequantize(&q.view());
        assert!(max_err(&w, &back) < 0.2, "max err {}", max_err(&w, &back));
    }

    #[test]
    fn test_absmax_maps_to_extreme_codes() {
        let w = [-2.0f32, 1.0, 0.5, 2.0];
        let q = quantize_int4(&w, 1, 4, 4).unwrap();
        assert_eq!(q.scales, vec![2.0 / 7.0]);
        let back = dequantize(&q.view());
        assert!((back[0] + 2.0).abs() < 1e-6);
        assert!((back[3] - 2.0).abs() < 1e-6);

        let q = quantize_nf4(&w, 1, 4, 4).unwrap();
        assert_eq!(q.packed[0] & 0x0F, 0);
        assert_eq!(q.packed[1] >> 4, 15);
    }

    #[test]
    fn test_zero_group() {
        let q = quantize_int8(&[0.0f32; 4], 2, 2, 2).unwrap();
        assert_eq!(q.scales, vec![0.0, 0.0]);
        assert_eq!(dequantize(&q.view()), vec![0.0; 4]);
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            quantize_int4(&[0.0; 5], 2, 3, 2),
            Err(QuantError::ShapeMismatch { expected: 6, actual: 5, .. })
        ));
        assert!(matches!(quantize_int4(&[0.0; 6], 2, 3, 0), Err(QuantError::InvalidGroupSize(0))));
        assert!(quantize_int8(&[f32::NAN, 0.0], 1, 2, 2).is_err());
        assert!(matches!(
            quantize_int8(&[0.0; 4], usize::MAX, 2, 2),
            Err(QuantError::ShapeMismatch { what: "weights", expected: usize::MAX, actual: 4 })
        ));
    }
}
