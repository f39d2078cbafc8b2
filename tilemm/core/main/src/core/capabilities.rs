//! CPU capability probing.
//!
//! Detection runs once per process; every later query reads the cached
//! [`Capabilities`] value.

use std::sync::OnceLock;

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Best vector unit available to the generic SIMD kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    /// Portable lane arrays only.
    Portable,
    /// NEON (128-bit).
    Neon,
    /// AVX2 + FMA (256-bit).
    Avx2Fma,
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimdLevel::Portable => write!(f, "portable"),
            SimdLevel::Neon => write!(f, "NEON"),
            SimdLevel::Avx2Fma => write!(f, "AVX2+FMA"),
        }
    }
}

/// Hardware compute extensions detected on this CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub avx2: bool,
    pub fma: bool,
    pub avx512f: bool,
    pub f16c: bool,
    pub neon: bool,
    pub fp16: bool,
    pub bf16: bool,
}

impl Capabilities {
    /// Detect the running CPU.
    pub fn detect() -> Self {
        #[allow(unused_mut)]
        let mut caps = Capabilities::default();

        #[cfg(target_arch = "x86_64")]
        {
            caps.avx2 = is_x86_feature_detected!("avx2");
            caps.fma = is_x86_feature_detected!("fma");
            caps.avx512f = is_x86_feature_detected!("avx512f");
            caps.f16c = is_x86_feature_detected!("f16c");
        }

        #[cfg(target_arch = "aarch64")]
        {
            caps.neon = std::arch::is_aarch64_feature_detected!("neon");
            caps.fp16 = std::arch::is_aarch64_feature_detected!("fp16");
            caps.bf16 = std::arch::is_aarch64_feature_detected!("bf16");
        }

        caps
    }

    /// A capability set with every extension absent.
    pub fn none() -> Self {
        Capabilities::default()
    }

    /// Vector unit the architecture-stage kernels can use.
    pub fn simd_level(&self) -> SimdLevel {
        if self.avx2 && self.fma {
            SimdLevel::Avx2Fma
        } else if self.neon {
            SimdLevel::Neon
        } else {
            SimdLevel::Portable
        }
    }

    /// Whether an outer-product tile unit is available.
    ///
    /// The tile kernels keep a full `TILE x TILE` accumulator resident and
    /// need fused multiply-add lanes to do so, which both AVX2+FMA and NEON
    /// provide.
    pub fn has_tile_unit(&self) -> bool {
        self.simd_level() != SimdLevel::Portable
    }

    /// Short human-readable summary, e.g. `"AVX2+FMA avx512f f16c tile"`.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.simd_level().to_string()];
        for (flag, name) in [
            (self.avx512f, "avx512f"),
            (self.f16c, "f16c"),
            (self.fp16, "fp16"),
            (self.bf16, "bf16"),
            (self.has_tile_unit(), "tile"),
        ] {
            if flag {
                parts.push(name.to_string());
            }
        }
        parts.join(" ")
    }
}

/// Capabilities of the running CPU, detected on first call.
pub fn capabilities() -> &'static Capabilities {
    CAPABILITIES.get_or_init(|| {
        let caps = Capabilities::detect();
        log::debug!("[capabilities] {}", caps.summary());
        caps
    })
}
