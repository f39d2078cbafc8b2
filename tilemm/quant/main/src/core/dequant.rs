//! Weight decoding for the NF4, Int4 and Int8 schemes.

use std::ops::Range;

use crate::api::types::{QuantScheme, QuantizedWeights};

/// Normal-float 4-bit code book: quantiles of N(0, 1) rescaled to [-1, 1].
pub const NF4_TABLE: [f32; 16] = [
    -1.0,
    -0.696_192_8,
    -0.525_073_05,
    -0.394_917_5,
    -0.284_441_38,
    -0.184_773_43,
    -0.091_050_036,
    0.0,
    0.079_580_3,
    0.160_930_2,
    0.246_112_3,
    0.337_915_24,
    0.440_709_83,
    0.562_617,
    0.722_956_84,
    1.0,
];

/// 4-bit code `idx`; even indices sit in the low nibble.
#[inline(always)]
pub fn nibble(packed: &[u8], idx: usize) -> u8 {
    let byte = packed[idx / 2];
    if idx % 2 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

impl QuantizedWeights<'_> {
    /// Unscaled value of code `idx`.
    #[inline(always)]
    pub fn code_value(&self, idx: usize) -> f32 {
        match self.scheme {
            QuantScheme::Nf4 => NF4_TABLE[nibble(self.packed, idx) as usize],
            QuantScheme::Int4 => nibble(self.packed, idx) as i32 as f32 - 8.0,
            QuantScheme::Int8 => {
                let codes: &[i8] = bytemuck::cast_slice(self.packed);
                codes[idx] as f32
            }
        }
    }

    /// Scale applied to weight `(k, n)`.
    #[inline(always)]
    pub fn scale(&self, k: usize, n: usize) -> f32 {
        self.scales[k * self.num_groups() + n / self.group_size]
    }

    /// Dequantized weight `(k, n)`.
    #[inline(always)]
    pub fn weight(&self, k: usize, n: usize) -> f32 {
        self.code_value(k * self.n + n) * self.scale(k, n)
    }

    /// Dequantize columns `cols` of every row into `dst`, row-major with
    /// row stride `cols.len()`.
    pub fn dequantize_columns(&self, cols: Range<usize>, dst: &mut [f32]) {
        let width = cols.len();
        assert!(cols.end <= self.n, "columns {:?} outside 0..{}", cols, self.n);
        assert!(
            dst.len() >= self.k * width,
            "dequant tile too small: need {} elements, got {}",
            self.k * width,
            dst.len()
        );
        if width == 0 {
            return;
        }
        let groups = self.num_groups();
        for (k, row) in dst.chunks_exact_mut(width).take(self.k).enumerate() {
            let scales = &self.scales[k * groups..(k + 1) * groups];
            let base = k * self.n;
            for (j, v) in row.iter_mut().enumerate() {
                let n = cols.start + j;
                *v = self.code_value(base + n) * scales[n / self.group_size];
            }
        }
    }
}

/// Full `K x N` row-major dequantization.
pub fn dequantize(weights: &QuantizedWeights<'_>) -> Vec<f32> {
    let mut out = vec![0.0f32; weights.k * weights.n];
    weights.dequantize_columns(0..weights.n, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::QuantError;

    #[test]
    fn test_nf4_table_sorted_and_bounded() {
        assert!(NF4_TABLE.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(NF4_TABLE[0], -1.0);
        assert_eq!(NF4_TABLE[7], 0.0);
        assert_eq!(NF4_TABLE[15], 1.0);
    }

    #[test]
    fn test_nibble_order() {
        let packed = [0xF0u8, 0x21];
        assert_eq!(nibble(&packed, 0), 0x0);
        assert_eq!(nibble(&packed, 1), 0xF);
        assert_eq!(nibble(&packed, 2), 0x1);
        assert_eq!(nibble(&packed, 3), 0x2);
    }

    #[test]
    fn test_int4_0xf0() {
        let packed = [0xF0u8];
        let scales = [1.0f32];
        let w = QuantizedWeights::new(QuantScheme::Int4, &packed, &scales, 1, 2, 2).unwrap();
        assert_eq!(dequantize(&w), vec![-8.0, 7.0]);
    }

    #[test]
    fn test_int4_range_bounds() {
        let packed: Vec<u8> = (0..=255u8).collect();
        let scale = 0.25f32;
        let scales = vec![scale; 16];
        let w = QuantizedWeights::new(QuantScheme::Int4, &packed, &scales, 16, 32, 32).unwrap();
        let values = dequantize(&w);
        assert!(values.iter().all(|&v| (-8.0 * scale..=7.0 * scale).contains(&v)));
        assert!(values.contains(&(-8.0 * scale)));
        assert!(values.contains(&(7.0 * scale)));
    }

    #[test]
    fn test_nf4_range_bounds() {
        let packed: Vec<u8> = (0..=255u8).collect();
        let scales = vec![2.0f32; 16];
        let w = QuantizedWeights::new(QuantScheme::Nf4, &packed, &scales, 16, 32, 32).unwrap();
        let values = dequantize(&w);
        assert!(values.iter().all(|&v| (-2.0..=2.0).contains(&v)));
        assert_eq!(values[0], -2.0);
        assert_eq!(values[1], -2.0);
    }

    #[test]
    fn test_int8_signed() {
        let packed = [0x80u8, 0x7F, 0xFF, 0x00];
        let scales = [0.5f32, 0.5];
        let w = QuantizedWeights::new(QuantScheme::Int8, &packed, &scales, 2, 2, 2).unwrap();
        assert_eq!(dequantize(&w), vec![-64.0, 63.5, -0.5, 0.0]);
    }

    #[test]
    fn test_group_scales_per_column() {
        // K=1, N=4, group 2: columns 0-1 use scales[0], columns 2-3 scales[1].
        let packed = [0x99u8, 0x99];
        let scales = [1.0f32, 3.0];
        let w = QuantizedWeights::new(QuantScheme::Int4, &packed, &scales, 1, 4, 2).unwrap();
        assert_eq!(dequantize(&w), vec![1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_dequantize_columns_matches_full() {
        let packed: Vec<u8> = (0..40u8).map(|v| v.wrapping_mul(37)).collect();
        let scales: Vec<f32> = (0..8).map(|i| 0.1 * (i + 1) as f32).collect();
        let w = QuantizedWeights::new(QuantScheme::Nf4, &packed, &scales, 4, 20, 10).unwrap();
        let full = dequantize(&w);
        let mut tile = vec![0.0f32; 4 * 7];
        w.dequantize_columns(9..16, &mut tile);
        for k in 0..4 {
            assert_eq!(&tile[k * 7..(k + 1) * 7], &full[k * 20 + 9..k * 20 + 16]);
        }
    }

    #[test]
    fn test_view_rejects_short_buffers() {
        let packed = [0u8; 3];
        let scales = [1.0f32; 4];
        let int4 = QuantScheme::Int4;
        assert!(QuantizedWeights::new(int4, &packed, &scales, 2, 4, 2).is_err());
        assert!(QuantizedWeights::new(int4, &[0u8; 4], &scales[..3], 2, 4, 2).is_err());
        assert!(QuantizedWeights::new(int4, &[0u8; 4], &scales, 2, 4, 0).is_err());
    }

    #[test]
    fn test_view_rejects_overflowing_shape() {
        let int8 = QuantScheme::Int8;
        let err = QuantizedWeights::new(int8, &[0u8; 4], &[1.0; 2], usize::MAX, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            QuantError::ShapeMismatch { what: "packed weights", expected: usize::MAX, actual: 4 }
        ));
    }
}
