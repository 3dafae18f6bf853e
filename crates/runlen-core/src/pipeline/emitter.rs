use std::io::Write;
use std::time::Instant;

use crate::codec::{BoundaryMerger, MergeMode};
use crate::core::TaskBoard;
use crate::pipeline::types::EmitStats;
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{Fragment, Result};

const PROFILE_TAG_STACK_EMITTER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_EMITTER];

/// Writes fragments to the output strictly in task order.
///
/// Runs on the calling thread while the workers encode. Each fragment is
/// written as soon as every earlier fragment has been written, then its
/// buffer is dropped back into the pool.
pub struct OrderedEmitter<W: Write> {
    writer: W,
    merger: BoundaryMerger,
    input_bytes: u64,
    waits: u64,
}

impl<W: Write> OrderedEmitter<W> {
    pub fn new(writer: W, mode: MergeMode) -> Self {
        Self {
            writer,
            merger: BoundaryMerger::new(mode),
            input_bytes: 0,
            waits: 0,
        }
    }

    /// Writes every fragment of `board` in order, then the final carry.
    ///
    /// # Errors
    /// Returns the first write error or the first failed task. The caller is
    /// responsible for aborting the board so workers stop.
    pub fn drain(&mut self, board: &TaskBoard) -> Result<EmitStats> {
        let started_at = Instant::now();

        loop {
            self.waits += 1;
            let Some(ready) = board.wait_ready()? else {
                break;
            };
            for fragment in ready {
                self.emit_fragment(&fragment)?;
                board.mark_flushed(fragment.task_id)?;
            }
        }
        self.finish()?;

        let stats = self.stats();
        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_EMITTER_WAIT_COUNT,
            stats.waits,
            &[("subsystem", "emitter"), ("op", "drain")],
        );
        profile::event(
            tags::PROFILE_EMITTER,
            &PROFILE_TAG_STACK_EMITTER,
            "drain",
            "ok",
            elapsed_us,
            "emitter drained board",
        );
        tracing::debug!(
            target: tags::PROFILE_EMITTER,
            fragments = stats.fragments,
            input_bytes = stats.input_bytes,
            runs = stats.runs_written,
            boundary_merges = stats.boundary_merges,
            waits = stats.waits,
            "emitter finished"
        );
        Ok(stats)
    }

    /// Merges one fragment into the output. Fragments must arrive in task order.
    pub fn emit_fragment(&mut self, fragment: &Fragment) -> Result<()> {
        let before = self.merger.stats();
        self.merger
            .push(fragment.input_index, fragment.as_slice(), &mut self.writer)?;
        let after = self.merger.stats();
        self.input_bytes += fragment.input_len as u64;

        telemetry::increment_counter(
            tags::METRIC_EMITTER_FRAGMENT_COUNT,
            1,
            &[("subsystem", "emitter"), ("op", "emit")],
        );
        telemetry::increment_counter(
            tags::METRIC_EMITTER_BYTES_WRITTEN,
            after.bytes_written - before.bytes_written,
            &[("subsystem", "emitter"), ("op", "emit")],
        );
        if after.boundary_merges > before.boundary_merges {
            telemetry::increment_counter(
                tags::METRIC_EMITTER_BOUNDARY_MERGE_COUNT,
                after.boundary_merges - before.boundary_merges,
                &[("subsystem", "emitter"), ("op", "emit")],
            );
        }
        Ok(())
    }

    /// Writes the remaining carry and flushes the writer.
    pub fn finish(&mut self) -> Result<()> {
        let before = self.merger.stats().bytes_written;
        self.merger.finish(&mut self.writer)?;
        telemetry::increment_counter(
            tags::METRIC_EMITTER_BYTES_WRITTEN,
            self.merger.stats().bytes_written - before,
            &[("subsystem", "emitter"), ("op", "finish")],
        );
        self.writer.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> EmitStats {
        EmitStats {
            input_bytes: self.input_bytes,
            waits: self.waits,
            ..EmitStats::from(self.merger.stats())
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::codec::encode;
    use crate::types::{ChunkData, Task};

    fn completed_board(pool: &BufferPool, chunks: &[(usize, &'static str)]) -> TaskBoard {
        let tasks = chunks
            .iter()
            .enumerate()
            .map(|(id, (input_index, chunk))| {
                Task::new(id, *input_index, ChunkData::from(chunk.as_bytes()))
            })
            .collect();
        let board = TaskBoard::new(tasks).expect("board");

        let taken: Vec<_> = std::iter::from_fn(|| board.try_take_next().expect("take")).collect();
        for task in taken.iter().rev() {
            let mut bytes = pool.acquire();
            bytes.extend_from_slice(&encode(task.data()));
            let fragment = Fragment {
                task_id: task.id,
                input_index: task.input_index,
                input_len: task.len(),
                bytes,
            };
            board.complete(task.id, Ok(fragment)).expect("complete");
        }
        board
    }

    #[test]
    fn drains_reverse_completed_board_in_order() {
        let pool = BufferPool::new(16, 8);
        let board = completed_board(&pool, &[(0, "aab"), (0, "bbc"), (0, "cc")]);

        let mut emitter = OrderedEmitter::new(Vec::new(), MergeMode::Lookback);
        let stats = emitter.drain(&board).expect("drain");
        assert_eq!(emitter.into_inner(), encode(b"aabbbccc"));
        assert_eq!(stats.fragments, 3);
        assert_eq!(stats.input_bytes, 8);
        assert_eq!(stats.boundary_merges, 2);
        assert_eq!(stats.bytes_written, 6);
        assert_eq!(board.watermark(), 3);
    }

    #[test]
    fn fragments_of_different_inputs_are_not_merged() {
        let pool = BufferPool::new(16, 8);
        let board = completed_board(&pool, &[(0, "aa"), (1, "aa")]);

        let mut emitter = OrderedEmitter::new(Vec::new(), MergeMode::Lookback);
        emitter.drain(&board).expect("drain");
        assert_eq!(emitter.into_inner(), vec![b'a', 2, b'a', 2]);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_returned() {
        let pool = BufferPool::new(16, 8);
        let board = completed_board(&pool, &[(0, "ab"), (0, "cd")]);

        let mut emitter = OrderedEmitter::new(FailingWriter, MergeMode::Lookback);
        assert!(matches!(
            emitter.drain(&board),
            Err(crate::RunlenError::Io(_))
        ));
    }
}
