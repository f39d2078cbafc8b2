use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use crate::api::error::{CoreError, CoreResult};
use crate::core::capabilities::capabilities;

/// Problem size (`batch * m * n * k`) at which parallel variants fan out.
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(64 * 64 * 64);

/// Minimum of `m`, `n` and `k` before a tile kernel is worth its session
/// entry/exit cost.
static TILE_MIN_DIM: AtomicUsize = AtomicUsize::new(32);

/// Edge length of a square cache block over the output matrix.
static BLOCK_SIZE: AtomicUsize = AtomicUsize::new(48);

/// Worker pool limit: 0 disables, negative is unlimited.
static MAX_PARALLELISM: AtomicI64 = AtomicI64::new(-1);

static FORCE_SCALAR: AtomicBool = AtomicBool::new(false);

pub const ENV_NUM_THREADS: &str = "TILEMM_NUM_THREADS";
pub const ENV_MAX_PARALLELISM: &str = "TILEMM_MAX_PARALLELISM";
pub const ENV_PAR_THRESHOLD: &str = "TILEMM_PAR_THRESHOLD";
pub const ENV_TILE_MIN_DIM: &str = "TILEMM_TILE_MIN_DIM";
pub const ENV_BLOCK_SIZE: &str = "TILEMM_BLOCK_SIZE";
pub const ENV_FORCE_SCALAR: &str = "TILEMM_FORCE_SCALAR";

/// Runtime configuration for dispatch, blocking and parallelism.
/// Must be applied (via `apply()`) before the first multiply to affect
/// kernel selection; thresholds can be changed at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Threads for the rayon pool used by bulk data-parallel helpers.
    /// 0 means auto-detect (use all available cores).
    pub num_threads: usize,
    /// GEMM worker pool limit: 0 = run inline, < 0 = unlimited, > 0 = bounded.
    pub max_parallelism: i64,
    /// `batch * m * n * k` below which parallel variants run serially.
    pub parallel_threshold: usize,
    /// Minimum `m`, `n`, `k` for the outer-product tile kernels.
    pub tile_min_dim: usize,
    /// Cache block edge (rounded up to the tile width by the kernels).
    pub block_size: usize,
    /// Bind only the scalar reference kernels.
    pub force_scalar: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            max_parallelism: -1,
            parallel_threshold: 64 * 64 * 64,
            tile_min_dim: 32,
            block_size: 48,
            force_scalar: false,
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from `TILEMM_*` environment variables, falling
    /// back to defaults for unset ones.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            cfg.num_threads = parse_var(ENV_NUM_THREADS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_PARALLELISM) {
            cfg.max_parallelism = parse_var(ENV_MAX_PARALLELISM, &v)?;
        }
        if let Some(v) = lookup(ENV_PAR_THRESHOLD) {
            cfg.parallel_threshold = parse_var(ENV_PAR_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_TILE_MIN_DIM) {
            cfg.tile_min_dim = parse_var(ENV_TILE_MIN_DIM, &v)?;
        }
        if let Some(v) = lookup(ENV_BLOCK_SIZE) {
            cfg.block_size = parse_var(ENV_BLOCK_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_FORCE_SCALAR) {
            cfg.force_scalar = parse_flag(&v);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.block_size == 0 {
            return Err(CoreError::InvalidConfig("block_size must be > 0".into()));
        }
        Ok(())
    }

    /// Apply this runtime configuration globally.
    ///
    /// Writes thresholds to global atomics and, when `num_threads > 0`,
    /// configures rayon's global thread pool.
    pub fn apply(&self) -> CoreResult<()> {
        self.validate()?;

        if self.num_threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build_global()
                .map_err(|e| {
                    CoreError::InvalidConfig(format!("Failed to set rayon thread pool: {}", e))
                })?;
        }

        PARALLEL_THRESHOLD.store(self.parallel_threshold, Ordering::Relaxed);
        TILE_MIN_DIM.store(self.tile_min_dim, Ordering::Relaxed);
        BLOCK_SIZE.store(self.block_size, Ordering::Relaxed);
        MAX_PARALLELISM.store(self.max_parallelism, Ordering::Relaxed);
        FORCE_SCALAR.store(self.force_scalar, Ordering::Relaxed);

        log::info!(
            "[runtime] SIMD: {} | threads: {} | max_parallelism: {} | block: {} | tile_min: {}{}",
            capabilities().summary(),
            rayon::current_num_threads(),
            self.max_parallelism,
            self.block_size,
            self.tile_min_dim,
            if self.force_scalar { " | scalar only" } else { "" },
        );

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> CoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidConfig(format!("{}={:?} is not a valid number", key, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn tile_min_dim() -> usize {
    TILE_MIN_DIM.load(Ordering::Relaxed)
}

pub fn block_size() -> usize {
    BLOCK_SIZE.load(Ordering::Relaxed).max(1)
}

pub fn max_parallelism() -> i64 {
    MAX_PARALLELISM.load(Ordering::Relaxed)
}

/// Scalar-only dispatch, either applied through [`RuntimeConfig`] or set
/// in the environment.
pub fn force_scalar() -> bool {
    FORCE_SCALAR.load(Ordering::Relaxed)
        || std::env::var(ENV_FORCE_SCALAR).map(|v| parse_flag(&v)).unwrap_or(false)
}

/// Optimization profiles for A/B benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptProfile {
    /// Defaults.
    Optimized,
    /// Scalar kernels, no parallel fan-out.
    Baseline,
    /// Lower thresholds for aggressive tiling and parallelism.
    Aggressive,
}

impl OptProfile {
    /// Build a `RuntimeConfig` matching this profile.
    pub fn runtime_config(&self) -> RuntimeConfig {
        match self {
            OptProfile::Optimized => RuntimeConfig::default(),
            OptProfile::Baseline => RuntimeConfig {
                max_parallelism: 0,
                parallel_threshold: usize::MAX,
                tile_min_dim: usize::MAX,
                force_scalar: true,
                ..RuntimeConfig::default()
            },
            OptProfile::Aggressive => RuntimeConfig {
                parallel_threshold: 32 * 32 * 32,
                tile_min_dim: 16,
                ..RuntimeConfig::default()
            },
        }
    }
}
