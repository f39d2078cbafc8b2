pub mod activation;
pub mod dequant;
pub mod fused;
pub mod quantize;
