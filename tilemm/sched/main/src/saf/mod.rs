pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::pool::{PoolScope, SleepGuard, WorkerPool};
pub use crate::core::queue::{ClosedQueue, WorkQueue};
pub use crate::core::split::feed_work_items;
