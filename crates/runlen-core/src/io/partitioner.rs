use std::time::Instant;

use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{ChunkData, Result, Task};

/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

const PROFILE_TAG_STACK_PARTITION: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_PARTITION];

/// Ordered task list for one encoding run.
#[derive(Debug, Clone, Default)]
pub struct ChunkPlan {
    /// Tasks with dense ids `0..len`, in input order then chunk order.
    pub tasks: Vec<Task>,
    pub input_bytes_total: u64,
    /// Number of tasks created for each input, in input order.
    pub chunks_per_input: Vec<usize>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Splits inputs into fixed-size chunks.
///
/// Every input contributes `len / chunk_size` full chunks followed by one
/// shorter chunk when the length is not a multiple of the chunk size. Empty
/// inputs contribute nothing.
#[derive(Debug, Clone)]
pub struct ChunkPartitioner {
    chunk_size: usize,
}

impl Default for ChunkPartitioner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkPartitioner {
    /// Creates a partitioner; a chunk size of zero is raised to one.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks an input of `len` bytes is split into.
    pub fn chunk_count_for(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Builds the task list for `inputs`.
    ///
    /// # Errors
    /// Only fails if a chunk range cannot be sliced, which indicates a
    /// broken input view.
    pub fn plan(&self, inputs: &[ChunkData]) -> Result<ChunkPlan> {
        let started_at = Instant::now();
        let task_count = inputs
            .iter()
            .map(|input| self.chunk_count_for(input.len()))
            .sum();

        let mut plan = ChunkPlan {
            tasks: Vec::with_capacity(task_count),
            input_bytes_total: 0,
            chunks_per_input: Vec::with_capacity(inputs.len()),
        };

        for (input_index, input) in inputs.iter().enumerate() {
            let len = input.len();
            if len == 0 {
                telemetry::increment_counter(
                    tags::METRIC_PARTITION_EMPTY_INPUT_COUNT,
                    1,
                    &[("subsystem", "partition"), ("op", "plan")],
                );
            }

            let mut start = 0usize;
            while start < len {
                let end = start.saturating_add(self.chunk_size).min(len);
                let id = plan.tasks.len();
                plan.tasks
                    .push(Task::new(id, input_index, input.slice(start, end)?));
                start = end;
            }

            plan.chunks_per_input.push(self.chunk_count_for(len));
            plan.input_bytes_total += len as u64;
        }

        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_PARTITION_PLAN_COUNT,
            1,
            &[("subsystem", "partition"), ("op", "plan")],
        );
        telemetry::increment_counter(
            tags::METRIC_PARTITION_TASK_COUNT,
            plan.tasks.len() as u64,
            &[("subsystem", "partition"), ("op", "plan")],
        );
        profile::event(
            tags::PROFILE_PARTITION,
            &PROFILE_TAG_STACK_PARTITION,
            "plan",
            "ok",
            elapsed_us,
            "partition plan completed",
        );
        tracing::debug!(
            target: tags::PROFILE_PARTITION,
            inputs = inputs.len(),
            tasks = plan.tasks.len(),
            chunk_size = self.chunk_size,
            input_bytes = plan.input_bytes_total,
            "partitioned inputs"
        );

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(plan: &ChunkPlan) -> Vec<usize> {
        plan.tasks.iter().map(Task::len).collect()
    }

    #[test]
    fn full_chunks_then_remainder() {
        let plan = ChunkPartitioner::new(4)
            .plan(&[ChunkData::from(vec![0u8; 10])])
            .expect("plan");
        assert_eq!(lengths(&plan), vec![4, 4, 2]);
        assert_eq!(plan.chunks_per_input, vec![3]);
        assert_eq!(plan.input_bytes_total, 10);
    }

    #[test]
    fn exact_multiple_has_no_remainder_chunk() {
        let plan = ChunkPartitioner::new(5)
            .plan(&[ChunkData::from(vec![0u8; 15])])
            .expect("plan");
        assert_eq!(lengths(&plan), vec![5, 5, 5]);
    }

    #[test]
    fn ids_are_dense_across_inputs_and_empty_inputs_are_skipped() {
        let inputs = [
            ChunkData::from(b"abc".to_vec()),
            ChunkData::from(Vec::new()),
            ChunkData::from(b"defgh".to_vec()),
        ];
        let plan = ChunkPartitioner::new(2).plan(&inputs).expect("plan");

        let ids: Vec<_> = plan.tasks.iter().map(|task| task.id).collect();
        let owners: Vec<_> = plan.tasks.iter().map(|task| task.input_index).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(owners, vec![0, 0, 2, 2, 2]);
        assert_eq!(plan.chunks_per_input, vec![2, 0, 3]);
        assert_eq!(plan.tasks[3].data(), b"fg");
    }

    #[test]
    fn chunk_larger_than_input_yields_single_task() {
        let plan = ChunkPartitioner::new(1 << 20)
            .plan(&[ChunkData::from(b"tiny".to_vec())])
            .expect("plan");
        assert_eq!(lengths(&plan), vec![4]);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let partitioner = ChunkPartitioner::new(0);
        assert_eq!(partitioner.chunk_size(), 1);
        assert_eq!(partitioner.chunk_count_for(3), 3);
    }

    #[test]
    fn no_inputs_yield_empty_plan() {
        let plan = ChunkPartitioner::default().plan(&[]).expect("plan");
        assert!(plan.is_empty());
        assert_eq!(plan.input_bytes_total, 0);
    }
}
