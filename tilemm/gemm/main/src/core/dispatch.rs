//! Capability dispatcher.
//!
//! Built once from detected [`Capabilities`]: every table starts from the
//! scalar baseline, then each stage in [`STAGE_ORDER`] that the CPU supports
//! overwrites the entries it provides.

use std::fmt::Write as _;
use std::sync::OnceLock;

use tilemm_core::{capabilities, force_scalar, Capabilities};

use crate::api::types::{GemmElement, KernelTable, Stage, STAGE_ORDER};

static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Dispatcher {
    caps: Capabilities,
    scalar_only: bool,
    stages: Vec<Stage>,
    pub(crate) f32: KernelTable<f32>,
    pub(crate) f64: KernelTable<f64>,
}

impl Dispatcher {
    /// Bind tables for `caps`. With `scalar_only` no stage is applied.
    pub fn with_capabilities(caps: Capabilities, scalar_only: bool) -> Self {
        let mut single = <f32 as GemmElement>::scalar_table();
        let mut double = <f64 as GemmElement>::scalar_table();
        let mut stages = Vec::with_capacity(STAGE_ORDER.len());

        if !scalar_only {
            for stage in STAGE_ORDER {
                if !stage.applies(&caps) {
                    continue;
                }
                let bound_single = <f32 as GemmElement>::bind_stage(stage, &caps, &mut single);
                let bound_double = <f64 as GemmElement>::bind_stage(stage, &caps, &mut double);
                if bound_single || bound_double {
                    stages.push(stage);
                } else {
                    log::debug!("[dispatch] no {} kernels for {} here", stage, caps.summary());
                }
            }
        }

        Self {
            caps,
            scalar_only,
            stages,
            f32: single,
            f64: double,
        }
    }

    /// Bind tables for the running CPU, honoring the scalar-only override.
    pub fn detect() -> Self {
        Self::with_capabilities(*capabilities(), force_scalar())
    }

    /// A dispatcher bound to the scalar reference kernels only.
    pub fn scalar() -> Self {
        Self::with_capabilities(Capabilities::none(), true)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn is_scalar_only(&self) -> bool {
        self.scalar_only
    }

    /// Stages applied, in application order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn table<T: GemmElement>(&self) -> &KernelTable<T> {
        T::table(self)
    }

    /// One line per bound entry, e.g. `f32 matmul            avx2-f32x8 (arch)`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        describe_table(&mut out, "f32", &self.f32);
        describe_table(&mut out, "f64", &self.f64);
        out
    }
}

fn describe_table<T>(out: &mut String, ty: &str, table: &KernelTable<T>) {
    let mut line = |op: &str, entry: &dyn std::fmt::Debug| {
        let _ = writeln!(out, "{} {:<16} {:?}", ty, op, entry);
    };
    line("matmul", &table.matmul);
    line("matmul_klast", &table.matmul_klast);
    line("blocked", &table.blocked);
    line("transpose", &table.transpose);
    match &table.tile {
        Some(tile) => {
            line("tile", &tile.gemm);
            line("tile_blocked", &tile.blocked);
        }
        None => line("tile", &"unavailable"),
    }
}

/// The process-wide dispatcher, bound on first use.
pub fn dispatcher() -> &'static Dispatcher {
    DISPATCHER.get_or_init(|| {
        let d = Dispatcher::detect();
        log::info!(
            "[dispatch] {} | stages: {:?}{} | f32 matmul: {} | f32 tile: {}",
            d.caps.summary(),
            d.stages,
            if d.scalar_only { " | scalar only" } else { "" },
            d.f32.matmul.name,
            d.f32.tile.map(|t| t.gemm.name).unwrap_or("none"),
        );
        d
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_generic_arch_microarch() {
        assert_eq!(STAGE_ORDER, [Stage::Generic, Stage::Arch, Stage::MicroArch]);
        assert!(STAGE_ORDER.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_scalar_only_binds_baseline() {
        let d = Dispatcher::scalar();
        assert!(d.stages().is_empty());
        assert_eq!(d.table::<f32>().matmul.name, "scalar");
        assert!(d.table::<f32>().matmul.stage.is_none());
        assert!(d.table::<f64>().tile.is_none());
    }

    #[test]
    fn test_force_scalar_ignores_capabilities() {
        let caps = Capabilities::detect();
        let d = Dispatcher::with_capabilities(caps, true);
        assert!(d.stages().is_empty());
        assert_eq!(d.table::<f64>().transpose.name, "scalar-transpose");
    }

    #[test]
    fn test_portable_cpu_gets_generic_stage() {
        let d = Dispatcher::with_capabilities(Capabilities::none(), false);
        assert_eq!(d.stages(), &[Stage::Generic]);
        let table = d.table::<f32>();
        assert_eq!(table.matmul.name, "portable-f32x8");
        assert_eq!(table.matmul.stage, Some(Stage::Generic));
        assert!(table.tile.is_none());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_later_stages_overwrite_earlier() {
        let caps = Capabilities {
            avx2: true,
            fma: true,
            ..Capabilities::none()
        };
        let d = Dispatcher::with_capabilities(caps, false);
        assert_eq!(d.stages(), &STAGE_ORDER);

        let table = d.table::<f32>();
        assert_eq!(table.matmul.name, "avx2-f32x8");
        assert_eq!(table.matmul.stage, Some(Stage::Arch));
        assert_eq!(table.transpose.stage, Some(Stage::MicroArch));
        let tile = table.tile.expect("tile kernels bound");
        assert_eq!(tile.gemm.name, "avx2-tile-f32-16x16");
        assert_eq!(d.table::<f64>().tile.map(|t| t.gemm.name), Some("avx2-tile-f64-8x8"));
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_later_stages_overwrite_earlier() {
        let caps = Capabilities {
            neon: true,
            ..Capabilities::none()
        };
        let d = Dispatcher::with_capabilities(caps, false);
        assert_eq!(d.stages(), &STAGE_ORDER);
        assert_eq!(d.table::<f32>().matmul.name, "neon-f32x4");
        assert_eq!(d.table::<f32>().tile.map(|t| t.gemm.name), Some("neon-tile-f32-16x16"));
    }

    #[test]
    fn test_stage_recorded_only_when_bound() {
        // Capabilities of the other architecture bind nothing past Generic.
        #[cfg(target_arch = "aarch64")]
        let foreign = Capabilities { avx2: true, fma: true, ..Capabilities::none() };
        #[cfg(not(target_arch = "aarch64"))]
        let foreign = Capabilities { neon: true, ..Capabilities::none() };

        let d = Dispatcher::with_capabilities(foreign, false);
        assert_eq!(d.stages(), &[Stage::Generic]);
        assert_eq!(d.table::<f32>().matmul.name, "portable-f32x8");
        assert_eq!(d.table::<f64>().transpose.stage, Some(Stage::Generic));
        assert!(d.table::<f32>().tile.is_none());
    }

    #[test]
    fn test_describe_lists_every_operation() {
        let text = Dispatcher::with_capabilities(Capabilities::none(), false).describe();
        for op in ["matmul", "matmul_klast", "blocked", "transpose", "tile"] {
            assert!(text.contains(op), "missing {} in\n{}", op, text);
        }
        assert!(text.contains("unavailable"));
    }
}
