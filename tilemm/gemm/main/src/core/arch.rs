//! Per-ISA kernel instantiations and stage binding.
//!
//! The generic kernels are `#[inline(always)]`; each wrapper below inlines
//! them into a function compiled for one feature set, which is what the
//! dispatch table stores.

use tilemm_core::{Capabilities, Element, SimdLevel};

use crate::api::types::{GemmElement, KernelEntry, KernelTable, Stage};
use crate::core::scalar;
use crate::core::dispatch::Dispatcher;

macro_rules! vector_kernels {
    ($(#[$attr:meta])* $name:ident: $elem:ty => $vec:ty, $blk:ty, $label:literal) => {
        pub(crate) mod $name {
            use crate::api::types::{GemmCall, KernelEntry, KernelTable, Stage};
            use std::ops::Range;

            $(#[$attr])*
            unsafe fn matmul(call: &GemmCall<$elem>) {
                crate::core::vector::gemm::<$vec>(call)
            }

            $(#[$attr])*
            unsafe fn matmul_klast(call: &GemmCall<$elem>) {
                crate::core::vector::gemm_klast::<$vec>(call)
            }

            $(#[$attr])*
            unsafe fn blocked(call: &GemmCall<$elem>, block: usize) {
                crate::core::vector::blocked::<$vec>(call, block)
            }

            $(#[$attr])*
            unsafe fn transpose(
                src: *const $elem,
                dst: *mut $elem,
                rows: usize,
                cols: usize,
                range: Range<usize>,
            ) {
                crate::core::transpose::blocked::<$elem, $blk>(src, dst, rows, cols, range)
            }

            pub(crate) fn bind(stage: Stage, table: &mut KernelTable<$elem>) {
                table.matmul = KernelEntry::staged(stage, $label, matmul);
                table.matmul_klast =
                    KernelEntry::staged(stage, concat!($label, "-dot"), matmul_klast);
                table.blocked = KernelEntry::staged(stage, concat!($label, "-blocked"), blocked);
                table.transpose =
                    KernelEntry::staged(stage, concat!($label, "-transpose"), transpose);
            }
        }
    };
}

macro_rules! tile_kernels {
    (
        $(#[$attr:meta])* $name:ident: $elem:ty => $vec:ty, $blk:ty,
        tile = $tile:literal, vpr = $vpr:literal, $label:literal
    ) => {
        pub(crate) mod $name {
            use crate::api::types::{GemmCall, KernelEntry, KernelTable, Stage, TileKernels};
            use std::ops::Range;

            const _: () = assert!($tile == <$elem as tilemm_core::Element>::TILE);

            $(#[$attr])*
            unsafe fn gemm(call: &GemmCall<$elem>) {
                crate::core::tile::gemm::<$vec, { $tile }, { $vpr }>(call)
            }

            $(#[$attr])*
            unsafe fn blocked(call: &GemmCall<$elem>, block: usize) {
                crate::core::tile::blocked::<$vec, { $tile }, { $vpr }>(call, block)
            }

            $(#[$attr])*
            unsafe fn transpose(
                src: *const $elem,
                dst: *mut $elem,
                rows: usize,
                cols: usize,
                range: Range<usize>,
            ) {
                crate::core::transpose::staged::<$elem, $blk>(src, dst, rows, cols, range)
            }

            pub(crate) fn bind(stage: Stage, table: &mut KernelTable<$elem>) {
                table.transpose =
                    KernelEntry::staged(stage, concat!($label, "-staged-transpose"), transpose);
                table.tile = Some(TileKernels {
                    gemm: KernelEntry::staged(stage, $label, gemm),
                    blocked: KernelEntry::staged(stage, concat!($label, "-blocked"), blocked),
                });
            }
        }
    };
}

vector_kernels!(
    portable_f32: f32 => tilemm_core::Portable<f32, 8>,
    crate::core::transpose::PortableBlock,
    "portable-f32x8"
);
vector_kernels!(
    portable_f64: f64 => tilemm_core::Portable<f64, 4>,
    crate::core::transpose::PortableBlock,
    "portable-f64x4"
);

#[cfg(target_arch = "x86_64")]
vector_kernels!(
    #[target_feature(enable = "avx2,fma")]
    avx2_f32: f32 => tilemm_core::F32x8, crate::core::transpose::x86::Avx2F32, "avx2-f32x8"
);
#[cfg(target_arch = "x86_64")]
vector_kernels!(
    #[target_feature(enable = "avx2,fma")]
    avx2_f64: f64 => tilemm_core::F64x4, crate::core::transpose::x86::Avx2F64, "avx2-f64x4"
);
#[cfg(target_arch = "x86_64")]
tile_kernels!(
    #[target_feature(enable = "avx2,fma")]
    avx2_tile_f32: f32 => tilemm_core::F32x8, crate::core::transpose::x86::Avx2F32,
    tile = 16, vpr = 2, "avx2-tile-f32-16x16"
);
#[cfg(target_arch = "x86_64")]
tile_kernels!(
    #[target_feature(enable = "avx2,fma")]
    avx2_tile_f64: f64 => tilemm_core::F64x4, crate::core::transpose::x86::Avx2F64,
    tile = 8, vpr = 2, "avx2-tile-f64-8x8"
);

#[cfg(target_arch = "aarch64")]
vector_kernels!(
    #[target_feature(enable = "neon")]
    neon_f32: f32 => tilemm_core::F32x4, crate::core::transpose::arm::NeonF32, "neon-f32x4"
);
#[cfg(target_arch = "aarch64")]
vector_kernels!(
    #[target_feature(enable = "neon")]
    neon_f64: f64 => tilemm_core::F64x2, crate::core::transpose::arm::NeonF64, "neon-f64x2"
);
#[cfg(target_arch = "aarch64")]
tile_kernels!(
    #[target_feature(enable = "neon")]
    neon_tile_f32: f32 => tilemm_core::F32x4, crate::core::transpose::arm::NeonF32,
    tile = 16, vpr = 4, "neon-tile-f32-16x16"
);
#[cfg(target_arch = "aarch64")]
tile_kernels!(
    #[target_feature(enable = "neon")]
    neon_tile_f64: f64 => tilemm_core::F64x2, crate::core::transpose::arm::NeonF64,
    tile = 8, vpr = 4, "neon-tile-f64-8x8"
);

fn scalar_table<T: Element>() -> KernelTable<T> {
    KernelTable {
        matmul: KernelEntry::baseline("scalar", scalar::gemm::<T>),
        matmul_klast: KernelEntry::baseline("scalar", scalar::gemm::<T>),
        blocked: KernelEntry::baseline("scalar-blocked", scalar::blocked::<T>),
        transpose: KernelEntry::baseline("scalar-transpose", scalar::transpose_rows::<T>),
        tile: None,
    }
}

impl GemmElement for f32 {
    fn scalar_table() -> KernelTable<f32> {
        scalar_table()
    }

    #[allow(unused_variables)]
    fn bind_stage(stage: Stage, caps: &Capabilities, table: &mut KernelTable<f32>) -> bool {
        match stage {
            Stage::Generic => {
                portable_f32::bind(stage, table);
                true
            }
            Stage::Arch => {
                #[cfg(target_arch = "x86_64")]
                if caps.simd_level() == SimdLevel::Avx2Fma {
                    avx2_f32::bind(stage, table);
                    return true;
                }
                #[cfg(target_arch = "aarch64")]
                if caps.simd_level() == SimdLevel::Neon {
                    neon_f32::bind(stage, table);
                    return true;
                }
                false
            }
            Stage::MicroArch => {
                #[cfg(target_arch = "x86_64")]
                if caps.simd_level() == SimdLevel::Avx2Fma {
                    avx2_tile_f32::bind(stage, table);
                    return true;
                }
                #[cfg(target_arch = "aarch64")]
                if caps.simd_level() == SimdLevel::Neon {
                    neon_tile_f32::bind(stage, table);
                    return true;
                }
                false
            }
        }
    }

    fn table(dispatcher: &Dispatcher) -> &KernelTable<f32> {
        &dispatcher.f32
    }
}

impl GemmElement for f64 {
    fn scalar_table() -> KernelTable<f64> {
        scalar_table()
    }

    #[allow(unused_variables)]
    fn bind_stage(stage: Stage, caps: &Capabilities, table: &mut KernelTable<f64>) -> bool {
        match stage {
            Stage::Generic => {
                portable_f64::bind(stage, table);
                true
            }
            Stage::Arch => {
                #[cfg(target_arch = "x86_64")]
                if caps.simd_level() == SimdLevel::Avx2Fma {
                    avx2_f64::bind(stage, table);
                    return true;
                }
                #[cfg(target_arch = "aarch64")]
                if caps.simd_level() == SimdLevel::Neon {
                    neon_f64::bind(stage, table);
                    return true;
                }
                false
            }
            Stage::MicroArch => {
                #[cfg(target_arch = "x86_64")]
                if caps.simd_level() == SimdLevel::Avx2Fma {
                    avx2_tile_f64::bind(stage, table);
                    return true;
                }
                #[cfg(target_arch = "aarch64")]
                if caps.simd_level() == SimdLevel::Neon {
                    neon_tile_f64::bind(stage, table);
                    return true;
                }
                false
            }
        }
    }

    fn table(dispatcher: &Dispatcher) -> &KernelTable<f64> {
        &dispatcher.f64
    }
}
