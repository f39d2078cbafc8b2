use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Buffer too small for {what}: need {needed} elements, got {actual}")]
    BufferTooSmall {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
