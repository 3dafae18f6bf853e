/// Profiling target for memory-mapped file operations.
pub const PROFILE_MMAP: &str = "runlen.profile.mmap";
/// Profiling target for chunk partitioning.
pub const PROFILE_PARTITION: &str = "runlen.profile.partition";
/// Profiling target for buffer pool operations.
pub const PROFILE_BUFFER: &str = "runlen.profile.buffer";
/// Profiling target for worker runtime.
pub const PROFILE_WORKER: &str = "runlen.profile.worker";
/// Profiling target for the ordered emitter.
pub const PROFILE_EMITTER: &str = "runlen.profile.emitter";
/// Profiling target for end-to-end pipeline runs.
pub const PROFILE_PIPELINE: &str = "runlen.profile.pipeline";

/// Global system-level tag shared by all profiling events.
pub const TAG_SYSTEM: &str = "system";
pub const TAG_MMAP: &str = "mmap";
pub const TAG_PARTITION: &str = "partition";
pub const TAG_BUFFER: &str = "buffer";
pub const TAG_WORKER: &str = "worker";
pub const TAG_EMITTER: &str = "emitter";
pub const TAG_PIPELINE: &str = "pipeline";

pub const METRIC_MMAP_OPEN_COUNT: &str = "runlen.mmap.open.count";
pub const METRIC_MMAP_OPEN_LATENCY_US: &str = "runlen.mmap.open.latency_us";

pub const METRIC_PARTITION_PLAN_COUNT: &str = "runlen.partition.plan.count";
pub const METRIC_PARTITION_TASK_COUNT: &str = "runlen.partition.task.count";
pub const METRIC_PARTITION_EMPTY_INPUT_COUNT: &str = "runlen.partition.empty_input.count";

pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "runlen.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "runlen.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_ACQUIRE_LATENCY_US: &str = "runlen.buffer.acquire.latency_us";
pub const METRIC_BUFFER_RECYCLE_OK_COUNT: &str = "runlen.buffer.recycle.ok.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "runlen.buffer.recycle.dropped.count";

pub const METRIC_WORKER_TASK_COUNT: &str = "runlen.worker.task.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "runlen.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "runlen.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "runlen.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "runlen.worker.task.latency_us";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "runlen.worker.active.count";

pub const METRIC_EMITTER_FRAGMENT_COUNT: &str = "runlen.emitter.fragment.count";
pub const METRIC_EMITTER_WAIT_COUNT: &str = "runlen.emitter.wait.count";
pub const METRIC_EMITTER_BOUNDARY_MERGE_COUNT: &str = "runlen.emitter.boundary_merge.count";
pub const METRIC_EMITTER_BYTES_WRITTEN: &str = "runlen.emitter.bytes_written";

pub const METRIC_PIPELINE_RUN_COUNT: &str = "runlen.pipeline.run.count";
pub const METRIC_PIPELINE_RUN_LATENCY_US: &str = "runlen.pipeline.run.latency_us";
