pub mod buffer;
pub mod codec;
pub mod core;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use buffer::{BufferPool, PoolMetricsSnapshot, PooledBuffer};
pub use codec::{BoundaryMerger, MergeMode, MergeStats, RunEncoder, encode, encode_into, runs};
pub use crate::core::{PoolRuntimeSnapshot, TaskBoard, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot};
pub use error::RunlenError;
pub use io::{ChunkPartitioner, ChunkPlan, DEFAULT_CHUNK_SIZE, MmapInput, open_inputs};
pub use pipeline::{
    EmitStats, EncodePath, EncodePipeline, EncodeRunStats, EncoderConfig, OrderedEmitter,
    SequentialEncoder,
};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{ChunkData, Fragment, RUN_WIRE_SIZE, Result, Run, Task};
