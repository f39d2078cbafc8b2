use thiserror::Error;

pub type SchedResult<T> = Result<T, SchedError>;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("Worker budget must be at least 1")]
    NoWorkers,

    #[error("Block size for {axis} must be at least 1")]
    ZeroBlock { axis: &'static str },
}
