use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RunlenError;
use crate::codec::{MergeMode, MergeStats};
use crate::core::WorkerRuntimeSnapshot;
use crate::io::DEFAULT_CHUNK_SIZE;
use crate::types::Result;

/// Idle encoded buffers kept for reuse per configured worker.
const BUFFERS_PER_WORKER: usize = 4;

/// Construction config for the encode pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Bytes per chunk handed to one worker.
    pub chunk_size: usize,
    /// Number of encoding threads. One selects the sequential path.
    pub workers: usize,
    /// How runs split by a chunk boundary are merged.
    pub merge_mode: MergeMode,
    /// Maximum idle buffers kept by the default buffer pool.
    pub buffer_pool_capacity: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
            merge_mode: MergeMode::default(),
            buffer_pool_capacity: BUFFERS_PER_WORKER,
        }
    }
}

impl EncoderConfig {
    /// Creates a config with the given chunk size and worker count.
    ///
    /// The buffer pool keeps a few idle buffers per worker.
    pub fn new(chunk_size: usize, workers: usize) -> Self {
        Self {
            chunk_size,
            workers,
            merge_mode: MergeMode::default(),
            buffer_pool_capacity: workers.max(1).saturating_mul(BUFFERS_PER_WORKER),
        }
    }

    pub fn with_merge_mode(mut self, merge_mode: MergeMode) -> Self {
        self.merge_mode = merge_mode;
        self
    }

    /// Rejects a zero chunk size or worker count.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RunlenError::InvalidConfig("chunk size must be at least 1"));
        }
        if self.workers == 0 {
            return Err(RunlenError::InvalidConfig("worker count must be at least 1"));
        }
        Ok(())
    }

    /// True when inputs are encoded on the calling thread only.
    pub fn is_sequential(&self) -> bool {
        self.workers == 1
    }
}

/// Which code path produced an encoding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodePath {
    Sequential,
    Parallel,
}

/// Counters collected by the ordered emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub fragments: u64,
    /// Source bytes covered by the emitted fragments.
    pub input_bytes: u64,
    pub runs_written: u64,
    pub bytes_written: u64,
    pub boundary_merges: u64,
    /// Times the emitter had to block for the next fragment in order.
    pub waits: u64,
}

impl From<MergeStats> for EmitStats {
    fn from(stats: MergeStats) -> Self {
        Self {
            fragments: stats.fragments,
            input_bytes: 0,
            runs_written: stats.runs_written,
            bytes_written: stats.bytes_written,
            boundary_merges: stats.boundary_merges,
            waits: 0,
        }
    }
}

/// Summary of one completed encoding run.
#[derive(Debug, Clone)]
pub struct EncodeRunStats {
    pub path: EncodePath,
    pub elapsed: Duration,
    pub inputs: usize,
    pub input_bytes_total: u64,
    pub output_bytes_total: u64,
    pub chunks_total: usize,
    pub runs_written: u64,
    pub boundary_merges: u64,
    /// Per-worker runtime; empty for the sequential path.
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

impl EncodeRunStats {
    /// Output size relative to input size, or zero for empty input.
    pub fn ratio(&self) -> f64 {
        if self.input_bytes_total == 0 {
            0.0
        } else {
            self.output_bytes_total as f64 / self.input_bytes_total as f64
        }
    }
}
