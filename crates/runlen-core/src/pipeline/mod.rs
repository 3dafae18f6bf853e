//! End-to-end encoding: partition, encode in parallel, emit in order.

pub mod emitter;
pub mod sequential;
pub mod types;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{BufferPool, PooledBuffer};
use crate::codec;
use crate::core::{TaskBoard, WorkerPool};
use crate::io::{ChunkPartitioner, MmapInput, open_inputs};
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{ChunkData, Result, Task};

pub use emitter::OrderedEmitter;
pub use sequential::{SequentialEncoder, merge_fragments};
pub use types::{EmitStats, EncodePath, EncodeRunStats, EncoderConfig};

const PROFILE_TAG_STACK_PIPELINE: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_PIPELINE];

/// Encodes a list of inputs into one run-length stream.
///
/// With one worker every input is encoded on the calling thread. With more,
/// inputs are cut into chunks that the worker pool encodes independently
/// while the calling thread stitches the fragments back together in order.
/// Both paths decode to the concatenation of the inputs.
///
/// # Example
/// ```
/// use runlen_core::{EncodePipeline, EncoderConfig};
///
/// let pipeline = EncodePipeline::new(EncoderConfig::new(4, 2))?;
/// let mut out = Vec::new();
/// pipeline.encode_sources(&[b"aaaaaaab".to_vec().into()], &mut out)?;
/// assert_eq!(out, vec![b'a', 7, b'b', 1]);
/// # Ok::<(), runlen_core::RunlenError>(())
/// ```
pub struct EncodePipeline {
    config: EncoderConfig,
    buffer_pool: Arc<BufferPool>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl EncodePipeline {
    /// Creates a pipeline with its own buffer pool.
    ///
    /// # Errors
    /// Returns [`crate::RunlenError::InvalidConfig`] for a zero chunk size or
    /// worker count.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let buffer_pool = Arc::new(BufferPool::new(
            codec::max_encoded_len(config.chunk_size),
            config.buffer_pool_capacity,
        ));
        Self::with_buffer_pool(config, buffer_pool)
    }

    /// Creates a pipeline sharing an existing buffer pool.
    pub fn with_buffer_pool(config: EncoderConfig, buffer_pool: Arc<BufferPool>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buffer_pool,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        })
    }

    /// Replaces the worker telemetry hooks.
    pub fn with_worker_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Maps every path and encodes the files in order.
    ///
    /// Nothing is written if any path cannot be mapped.
    pub fn encode_paths<P, W>(&self, paths: &[P], writer: &mut W) -> Result<EncodeRunStats>
    where
        P: AsRef<Path>,
        W: Write,
    {
        let inputs = open_inputs(paths)?;
        self.encode_inputs(&inputs, writer)
    }

    /// Encodes already mapped inputs in order.
    pub fn encode_inputs<W: Write>(
        &self,
        inputs: &[MmapInput],
        writer: &mut W,
    ) -> Result<EncodeRunStats> {
        let sources: Vec<ChunkData> = inputs.iter().map(MmapInput::data).collect();
        self.encode_sources(&sources, writer)
    }

    /// Encodes in-memory or mapped views in order.
    pub fn encode_sources<W: Write>(
        &self,
        sources: &[ChunkData],
        writer: &mut W,
    ) -> Result<EncodeRunStats> {
        let started_at = Instant::now();
        let result = if self.config.is_sequential() {
            self.encode_sequential(sources, writer)
        } else {
            self.encode_parallel(sources, writer)
        };

        let elapsed_us = profile::elapsed_us(started_at);
        let outcome = if result.is_ok() { "ok" } else { "error" };
        telemetry::increment_counter(
            tags::METRIC_PIPELINE_RUN_COUNT,
            1,
            &[("subsystem", "pipeline"), ("op", "encode"), ("result", outcome)],
        );
        telemetry::record_histogram(
            tags::METRIC_PIPELINE_RUN_LATENCY_US,
            elapsed_us,
            &[("subsystem", "pipeline"), ("op", "encode"), ("result", outcome)],
        );
        profile::event(
            tags::PROFILE_PIPELINE,
            &PROFILE_TAG_STACK_PIPELINE,
            "encode",
            outcome,
            elapsed_us,
            "pipeline encode completed",
        );

        let mut stats = result?;
        stats.elapsed = started_at.elapsed();
        tracing::debug!(
            target: tags::PROFILE_PIPELINE,
            path = ?stats.path,
            inputs = stats.inputs,
            input_bytes = stats.input_bytes_total,
            output_bytes = stats.output_bytes_total,
            chunks = stats.chunks_total,
            "encode finished"
        );
        Ok(stats)
    }

    fn encode_sequential<W: Write>(
        &self,
        sources: &[ChunkData],
        writer: &mut W,
    ) -> Result<EncodeRunStats> {
        let partitioner = ChunkPartitioner::new(self.config.chunk_size);
        let emitted = SequentialEncoder::new(self.config.chunk_size).encode(sources, writer)?;

        Ok(EncodeRunStats {
            path: EncodePath::Sequential,
            elapsed: Default::default(),
            inputs: sources.len(),
            input_bytes_total: emitted.input_bytes,
            output_bytes_total: emitted.bytes_written,
            chunks_total: sources
                .iter()
                .map(|source| partitioner.chunk_count_for(source.len()))
                .sum(),
            runs_written: emitted.runs_written,
            boundary_merges: emitted.boundary_merges,
            workers: Vec::new(),
        })
    }

    fn encode_parallel<W: Write>(
        &self,
        sources: &[ChunkData],
        writer: &mut W,
    ) -> Result<EncodeRunStats> {
        let plan = ChunkPartitioner::new(self.config.chunk_size).plan(sources)?;
        let chunks_total = plan.len();

        let board = Arc::new(TaskBoard::new(plan.tasks)?);
        let pool = WorkerPool::with_telemetry(
            self.config.workers,
            Arc::clone(&self.buffer_pool),
            Arc::clone(&self.telemetry),
        );
        let handle = pool.spawn(Arc::clone(&board), encode_chunk)?;

        let mut emitter = OrderedEmitter::new(writer, self.config.merge_mode);
        let emitted = match emitter.drain(&board) {
            Ok(stats) => stats,
            Err(error) => {
                board.abort();
                if let Err(join_error) = handle.join() {
                    tracing::warn!(
                        target: tags::PROFILE_PIPELINE,
                        error = %join_error,
                        "worker join failed after emit error"
                    );
                }
                return Err(error);
            }
        };

        let runtime = handle.runtime_snapshot();
        handle.join()?;

        Ok(EncodeRunStats {
            path: EncodePath::Parallel,
            elapsed: Default::default(),
            inputs: sources.len(),
            input_bytes_total: emitted.input_bytes,
            output_bytes_total: emitted.bytes_written,
            chunks_total,
            runs_written: emitted.runs_written,
            boundary_merges: emitted.boundary_merges,
            workers: runtime.workers,
        })
    }
}

/// Worker body: encodes one chunk with a fresh codec state.
fn encode_chunk(_worker_id: usize, task: &Task, pool: &BufferPool) -> Result<PooledBuffer> {
    let mut out = pool.acquire_with_capacity(codec::max_encoded_len(task.len()));
    codec::encode_into(task.data(), &mut out);
    Ok(out)
}
