pub mod task_board;
pub mod worker_pool;

pub use task_board::TaskBoard;
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot};
