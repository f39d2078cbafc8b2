pub mod arena;
pub mod capabilities;
pub mod config;
pub mod matrix;
pub mod simd;
pub mod streaming;
