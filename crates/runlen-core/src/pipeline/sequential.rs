use std::io::Write;

use crate::codec::{BoundaryMerger, MergeMode, RunEncoder};
use crate::pipeline::types::EmitStats;
use crate::types::{ChunkData, Result};

/// Single-threaded encoder used when only one worker is configured.
///
/// Each input is encoded with a fresh codec state and streamed to the
/// writer in blocks of `block_size` input bytes, so runs never span two
/// inputs and memory stays bounded regardless of input size.
#[derive(Debug, Clone)]
pub struct SequentialEncoder {
    block_size: usize,
}

impl SequentialEncoder {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Encodes every input in order into `writer`.
    pub fn encode<W>(&self, inputs: &[ChunkData], writer: &mut W) -> Result<EmitStats>
    where
        W: Write + ?Sized,
    {
        let mut stats = EmitStats::default();
        let mut scratch = Vec::with_capacity(crate::codec::max_encoded_len(self.block_size));

        for input in inputs {
            let mut encoder = RunEncoder::new();
            for block in input.as_slice().chunks(self.block_size) {
                scratch.clear();
                encoder.feed_slice(block, &mut scratch);
                self.flush(&scratch, writer, &mut stats)?;
            }

            if let Some(run) = encoder.finish() {
                self.flush(&run.to_wire(), writer, &mut stats)?;
            }
            stats.fragments += 1;
            stats.input_bytes += input.len() as u64;
        }

        writer.flush()?;
        Ok(stats)
    }

    fn flush<W>(&self, encoded: &[u8], writer: &mut W, stats: &mut EmitStats) -> Result<()>
    where
        W: Write + ?Sized,
    {
        if encoded.is_empty() {
            return Ok(());
        }
        writer.write_all(encoded)?;
        stats.bytes_written += encoded.len() as u64;
        stats.runs_written += (encoded.len() / crate::types::RUN_WIRE_SIZE) as u64;
        Ok(())
    }
}

/// Merges already encoded `(input_index, pairs)` fragments on one thread.
///
/// Produces exactly what the parallel path writes for the same fragments,
/// whatever order the workers finished them in. `input_bytes` is not known
/// here and stays zero.
pub fn merge_fragments<W>(
    fragments: &[(usize, Vec<u8>)],
    mode: MergeMode,
    writer: &mut W,
) -> Result<EmitStats>
where
    W: Write + ?Sized,
{
    let mut merger = BoundaryMerger::new(mode);
    for (input_index, fragment) in fragments {
        merger.push(*input_index, fragment, writer)?;
    }
    merger.finish(writer)?;
    Ok(EmitStats::from(merger.stats()))
}
