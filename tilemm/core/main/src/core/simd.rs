/// Vector primitive layer consumed by every tilemm kernel.
///
/// Kernels are written once against [`SimdVector`] and instantiated per ISA:
/// - x86_64: AVX2 + FMA (`F32x8`, `F64x4`)
/// - aarch64: NEON (`F32x4`, `F64x2`)
/// - anywhere: `Portable<T, L>` lane arrays the compiler may auto-vectorize
///
/// All methods are `unsafe`: ISA implementations require the matching CPU
/// feature, and `load`/`store` dereference raw pointers to `LANES` elements.
use crate::api::types::Element;

/// Largest lane count of any implementation; bounds `reduce_sum` scratch.
pub const MAX_LANES: usize = 16;

pub trait SimdVector: Copy {
    type Elem: Element;

    const LANES: usize;

    unsafe fn zero() -> Self;
    unsafe fn splat(x: Self::Elem) -> Self;
    unsafe fn load(ptr: *const Self::Elem) -> Self;
    unsafe fn store(self, ptr: *mut Self::Elem);
    unsafe fn add(a: Self, b: Self) -> Self;

    /// `a * b + acc`
    unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self;

    /// Horizontal sum of all lanes.
    #[inline(always)]
    unsafe fn reduce_sum(self) -> Self::Elem {
        debug_assert!(Self::LANES <= MAX_LANES);
        let mut lanes = [<Self::Elem as Element>::ZERO; MAX_LANES];
        self.store(lanes.as_mut_ptr());
        let mut sum = <Self::Elem as Element>::ZERO;
        for &v in &lanes[..Self::LANES] {
            sum += v;
        }
        sum
    }
}

/// Portable `L`-lane vector backed by a plain array.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
pub struct Portable<T, const L: usize>(pub [T; L]);

impl<T: Element, const L: usize> SimdVector for Portable<T, L> {
    type Elem = T;

    const LANES: usize = L;

    #[inline(always)]
    unsafe fn zero() -> Self {
        Portable([T::ZERO; L])
    }

    #[inline(always)]
    unsafe fn splat(x: T) -> Self {
        Portable([x; L])
    }

    #[inline(always)]
    unsafe fn load(ptr: *const T) -> Self {
        Portable(std::ptr::read_unaligned(ptr as *const [T; L]))
    }

    #[inline(always)]
    unsafe fn store(self, ptr: *mut T) {
        std::ptr::write_unaligned(ptr as *mut [T; L], self.0)
    }

    #[inline(always)]
    unsafe fn add(a: Self, b: Self) -> Self {
        let mut out = a.0;
        for (o, &v) in out.iter_mut().zip(b.0.iter()) {
            *o += v;
        }
        Portable(out)
    }

    #[inline(always)]
    unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self {
        let mut out = acc.0;
        for i in 0..L {
            out[i] += a.0[i] * b.0[i];
        }
        Portable(out)
    }
}

// --- x86_64 AVX2 + FMA ---

#[cfg(target_arch = "x86_64")]
pub mod x86 {
    use super::SimdVector;
    use std::arch::x86_64::*;

    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct F32x8(pub __m256);

    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct F64x4(pub __m256d);

    impl SimdVector for F32x8 {
        type Elem = f32;

        const LANES: usize = 8;

        #[inline(always)]
        unsafe fn zero() -> Self {
            F32x8(_mm256_setzero_ps())
        }

        #[inline(always)]
        unsafe fn splat(x: f32) -> Self {
            F32x8(_mm256_set1_ps(x))
        }

        #[inline(always)]
        unsafe fn load(ptr: *const f32) -> Self {
            F32x8(_mm256_loadu_ps(ptr))
        }

        #[inline(always)]
        unsafe fn store(self, ptr: *mut f32) {
            _mm256_storeu_ps(ptr, self.0)
        }

        #[inline(always)]
        unsafe fn add(a: Self, b: Self) -> Self {
            F32x8(_mm256_add_ps(a.0, b.0))
        }

        #[inline(always)]
        unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self {
            F32x8(_mm256_fmadd_ps(a.0, b.0, acc.0))
        }

        #[inline(always)]
        unsafe fn reduce_sum(self) -> f32 {
            let hi = _mm256_extractf128_ps(self.0, 1);
            let lo = _mm256_castps256_ps128(self.0);
            let sum128 = _mm_add_ps(lo, hi);
            let shuf = _mm_movehdup_ps(sum128);
            let sums = _mm_add_ps(sum128, shuf);
            let shuf2 = _mm_movehl_ps(sums, sums);
            _mm_cvtss_f32(_mm_add_ss(sums, shuf2))
        }
    }

    impl SimdVector for F64x4 {
        type Elem = f64;

        const LANES: usize = 4;

        #[inline(always)]
        unsafe fn zero() -> Self {
            F64x4(_mm256_setzero_pd())
        }

        #[inline(always)]
        unsafe fn splat(x: f64) -> Self {
            F64x4(_mm256_set1_pd(x))
        }

        #[inline(always)]
        unsafe fn load(ptr: *const f64) -> Self {
            F64x4(_mm256_loadu_pd(ptr))
        }

        #[inline(always)]
        unsafe fn store(self, ptr: *mut f64) {
            _mm256_storeu_pd(ptr, self.0)
        }

        #[inline(always)]
        unsafe fn add(a: Self, b: Self) -> Self {
            F64x4(_mm256_add_pd(a.0, b.0))
        }

        #[inline(always)]
        unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self {
            F64x4(_mm256_fmadd_pd(a.0, b.0, acc.0))
        }
    }
}

// --- aarch64 NEON ---

#[cfg(target_arch = "aarch64")]
pub mod arm {
    use super::SimdVector;
    use std::arch::aarch64::*;

    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct F32x4(pub float32x4_t);

    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct F64x2(pub float64x2_t);

    impl SimdVector for F32x4 {
        type Elem = f32;

        const LANES: usize = 4;

        #[inline(always)]
        unsafe fn zero() -> Self {
            F32x4(vdupq_n_f32(0.0))
        }

        #[inline(always)]
        unsafe fn splat(x: f32) -> Self {
            F32x4(vdupq_n_f32(x))
        }

        #[inline(always)]
        unsafe fn load(ptr: *const f32) -> Self {
            F32x4(vld1q_f32(ptr))
        }

        #[inline(always)]
        unsafe fn store(self, ptr: *mut f32) {
            vst1q_f32(ptr, self.0)
        }

        #[inline(always)]
        unsafe fn add(a: Self, b: Self) -> Self {
            F32x4(vaddq_f32(a.0, b.0))
        }

        #[inline(always)]
        unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self {
            F32x4(vfmaq_f32(acc.0, a.0, b.0))
        }

        #[inline(always)]
        unsafe fn reduce_sum(self) -> f32 {
            vaddvq_f32(self.0)
        }
    }

    impl SimdVector for F64x2 {
        type Elem = f64;

        const LANES: usize = 2;

        #[inline(always)]
        unsafe fn zero() -> Self {
            F64x2(vdupq_n_f64(0.0))
        }

        #[inline(always)]
        unsafe fn splat(x: f64) -> Self {
            F64x2(vdupq_n_f64(x))
        }

        #[inline(always)]
        unsafe fn load(ptr: *const f64) -> Self {
            F64x2(vld1q_f64(ptr))
        }

        #[inline(always)]
        unsafe fn store(self, ptr: *mut f64) {
            vst1q_f64(ptr, self.0)
        }

        #[inline(always)]
        unsafe fn add(a: Self, b: Self) -> Self {
            F64x2(vaddq_f64(a.0, b.0))
        }

        #[inline(always)]
        unsafe fn mul_add(a: Self, b: Self, acc: Self) -> Self {
            F64x2(vfmaq_f64(acc.0, a.0, b.0))
        }

        #[inline(always)]
        unsafe fn reduce_sum(self) -> f64 {
            vaddvq_f64(self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One `LANES`-wide multiply-add of `a` and `b`, reduced.
    unsafe fn dot<V: SimdVector>(a: &[V::Elem], b: &[V::Elem]) -> V::Elem {
        V::mul_add(V::load(a.as_ptr()), V::load(b.as_ptr()), V::zero()).reduce_sum()
    }

    #[test]
    fn test_portable_mul_add() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [2.0f32; 4];
        let mut out = [0.0f32; 4];
        unsafe {
            let acc = Portable::<f32, 4>::splat(1.0);
            let r = Portable::<f32, 4>::mul_add(
                Portable::load(a.as_ptr()),
                Portable::load(b.as_ptr()),
                acc,
            );
            r.store(out.as_mut_ptr());
        }
        assert_eq!(out, [3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_portable_reduce_sum() {
        let data: Vec<f64> = (1..=8).map(|v| v as f64).collect();
        let sum = unsafe { Portable::<f64, 8>::load(data.as_ptr()).reduce_sum() };
        assert_eq!(sum, 36.0);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_avx2_matches_portable() {
        if !(is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")) {
            return;
        }
        let a: Vec<f32> = (0..8).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..8).map(|i| 8.0 - i as f32).collect();
        let simd = unsafe { dot::<x86::F32x8>(&a, &b) };
        let portable = unsafe { dot::<Portable<f32, 8>>(&a, &b) };
        assert!((simd - portable).abs() < 1e-5, "avx2 {} vs portable {}", simd, portable);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_neon_matches_portable() {
        let a: Vec<f32> = (0..4).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..4).map(|i| 4.0 - i as f32).collect();
        let simd = unsafe { dot::<arm::F32x4>(&a, &b) };
        let portable = unsafe { dot::<Portable<f32, 4>>(&a, &b) };
        assert!((simd - portable).abs() < 1e-5, "neon {} vs portable {}", simd, portable);
    }
}
