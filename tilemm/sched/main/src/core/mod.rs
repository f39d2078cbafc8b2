pub mod pool;
pub mod queue;
pub mod split;
