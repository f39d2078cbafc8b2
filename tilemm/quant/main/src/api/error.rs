use thiserror::Error;

pub type QuantResult<T> = Result<T, QuantError>;

#[derive(Debug, Error)]
pub enum QuantError {
    #[error("Shape mismatch for {what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid group size {0}: must be > 0")]
    InvalidGroupSize(usize),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
