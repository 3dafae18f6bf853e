use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::types::{RUN_WIRE_SIZE, Result, Run};
use crate::RunlenError;

/// How a run split by a chunk boundary is stitched back together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeMode {
    /// Hold back the last pair of each fragment and fold it into the first
    /// pair of the next fragment when the combined count fits in one byte.
    /// When it does not fit, both pairs are written unchanged.
    #[default]
    Lookback,
    /// Accumulate the whole logical run across fragments and split it into
    /// full 255-count pairs, matching a single sequential pass exactly.
    Canonical,
}

/// Counters collected while merging fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub fragments: u64,
    pub runs_written: u64,
    pub bytes_written: u64,
    pub boundary_merges: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Carry {
    input_index: usize,
    symbol: u8,
    count: u64,
}

impl Carry {
    fn new(input_index: usize, run: Run) -> Self {
        Self {
            input_index,
            symbol: run.symbol,
            count: u64::from(run.count),
        }
    }
}

/// Stitches independently encoded fragments into one ordered stream.
///
/// Fragments must be pushed in task order. The last run of every fragment
/// is carried until the next fragment shows whether it continues; a carry
/// never crosses into a fragment of another input.
#[derive(Debug)]
pub struct BoundaryMerger {
    mode: MergeMode,
    carry: Option<Carry>,
    scratch: Vec<u8>,
    stats: MergeStats,
}

impl BoundaryMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            carry: None,
            scratch: Vec::new(),
            stats: MergeStats::default(),
        }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Returns true when a run is held back waiting for the next fragment.
    pub fn has_carry(&self) -> bool {
        self.carry.is_some()
    }

    /// Merges the next fragment and writes every pair that is final.
    ///
    /// # Errors
    /// Returns an error for a malformed fragment or a failed write.
    pub fn push<W>(&mut self, input_index: usize, fragment: &[u8], out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        if fragment.len() % RUN_WIRE_SIZE != 0 {
            return Err(RunlenError::InvalidFormat(
                "fragment length is not a whole number of records",
            ));
        }
        self.stats.fragments += 1;

        if self
            .carry
            .is_some_and(|carry| carry.input_index != input_index)
        {
            self.flush_carry(out)?;
        }
        if fragment.is_empty() {
            return Ok(());
        }

        match self.mode {
            MergeMode::Lookback => self.push_lookback(input_index, fragment, out),
            MergeMode::Canonical => self.push_canonical(input_index, fragment, out),
        }
    }

    /// Writes the carried run, if any. Call once after the last fragment.
    pub fn finish<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        self.flush_carry(out)
    }

    fn push_lookback<W>(&mut self, input_index: usize, fragment: &[u8], out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        let mut first = Run::from_wire([fragment[0], fragment[1]])?;

        if let Some(carry) = self.carry {
            let combined = carry.count + u64::from(first.count);
            if carry.symbol == first.symbol && combined <= u64::from(Run::MAX_COUNT) {
                self.carry = None;
                first.count = combined as u8;
                self.stats.boundary_merges += 1;
            } else {
                self.flush_carry(out)?;
            }
        }

        let last_start = fragment.len() - RUN_WIRE_SIZE;
        if last_start == 0 {
            self.carry = Some(Carry::new(input_index, first));
            return Ok(());
        }

        out.write_all(&first.to_wire())?;
        let middle = &fragment[RUN_WIRE_SIZE..last_start];
        out.write_all(middle)?;
        self.record_written(RUN_WIRE_SIZE + middle.len());

        let last = Run::from_wire([fragment[last_start], fragment[last_start + 1]])?;
        self.carry = Some(Carry::new(input_index, last));
        Ok(())
    }

    fn push_canonical<W>(&mut self, input_index: usize, fragment: &[u8], out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        self.scratch.clear();

        for (position, record) in fragment.chunks_exact(RUN_WIRE_SIZE).enumerate() {
            let run = Run::from_wire([record[0], record[1]])?;
            match self.carry.as_mut() {
                Some(carry) if carry.symbol == run.symbol => {
                    carry.count += u64::from(run.count);
                    if position == 0 {
                        self.stats.boundary_merges += 1;
                    }
                }
                Some(carry) => {
                    split_into(&mut self.scratch, *carry);
                    *carry = Carry::new(input_index, run);
                }
                None => self.carry = Some(Carry::new(input_index, run)),
            }
        }

        out.write_all(&self.scratch)?;
        self.record_written(self.scratch.len());
        Ok(())
    }

    fn flush_carry<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        let Some(carry) = self.carry.take() else {
            return Ok(());
        };

        self.scratch.clear();
        split_into(&mut self.scratch, carry);
        out.write_all(&self.scratch)?;
        self.record_written(self.scratch.len());
        Ok(())
    }

    fn record_written(&mut self, bytes: usize) {
        self.stats.bytes_written += bytes as u64;
        self.stats.runs_written += (bytes / RUN_WIRE_SIZE) as u64;
    }
}

/// Appends `carry` as greedy 255-count records followed by the remainder.
fn split_into(out: &mut Vec<u8>, carry: Carry) {
    let mut remaining = carry.count;
    while remaining > 0 {
        let count = remaining.min(u64::from(Run::MAX_COUNT));
        out.extend_from_slice(&[carry.symbol, count as u8]);
        remaining -= count;
    }
}
