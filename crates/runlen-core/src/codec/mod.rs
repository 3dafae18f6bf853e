//! Run-length codec over `(symbol, count)` byte pairs.
//!
//! The codec is pure: it knows nothing about files, chunks or threads. The
//! pipeline encodes each chunk with [`encode_into`] and repairs the chunk
//! boundaries afterwards with [`BoundaryMerger`].

pub mod merge;

use std::slice::ChunksExact;

use crate::types::{RUN_WIRE_SIZE, Result, Run};
use crate::RunlenError;

pub use merge::{BoundaryMerger, MergeMode, MergeStats};

/// Incremental encoder state: the byte of the open run and its length.
///
/// A pending count of zero means no run is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunEncoder {
    previous: u8,
    pending: u8,
}

impl RunEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a run is open and not yet emitted.
    pub fn has_open_run(&self) -> bool {
        self.pending != 0
    }

    /// Feeds one byte, returning the run it finalized, if any.
    #[inline]
    pub fn feed(&mut self, byte: u8) -> Option<Run> {
        if self.pending == 0 {
            self.previous = byte;
            self.pending = 1;
            return None;
        }

        if byte == self.previous && self.pending < Run::MAX_COUNT {
            self.pending += 1;
            return None;
        }

        let finished = Run::new(self.previous, self.pending);
        self.previous = byte;
        self.pending = 1;
        Some(finished)
    }

    /// Feeds every byte of `input`, appending finalized runs to `out`.
    ///
    /// The last run stays open so a following slice can extend it.
    pub fn feed_slice(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            if let Some(run) = self.feed(byte) {
                out.extend_from_slice(&run.to_wire());
            }
        }
    }

    /// Emits the open run, if any, and resets the state.
    pub fn finish(&mut self) -> Option<Run> {
        if self.pending == 0 {
            return None;
        }

        let run = Run::new(self.previous, self.pending);
        *self = Self::default();
        Some(run)
    }
}

/// Worst-case encoded size of `input_len` bytes: every byte opens a new run.
pub fn max_encoded_len(input_len: usize) -> usize {
    input_len.saturating_mul(RUN_WIRE_SIZE)
}

/// Encodes `input` with a fresh state and appends the pairs to `out`.
pub fn encode_into(input: &[u8], out: &mut Vec<u8>) {
    out.reserve(max_encoded_len(input.len()));

    let mut encoder = RunEncoder::new();
    encoder.feed_slice(input, out);
    if let Some(run) = encoder.finish() {
        out.extend_from_slice(&run.to_wire());
    }
}

/// Encodes `input` into a newly allocated buffer.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_encoded_len(input.len()));
    encode_into(input, &mut out);
    out
}

/// Iterates the records of an encoded stream.
pub fn runs(encoded: &[u8]) -> Runs<'_> {
    Runs {
        records: encoded.chunks_exact(RUN_WIRE_SIZE),
        trailing: encoded.len() % RUN_WIRE_SIZE != 0,
    }
}

/// Iterator over `(symbol, count)` records, see [`runs`].
///
/// Yields an error for a zero count or a dangling half record.
#[derive(Debug, Clone)]
pub struct Runs<'a> {
    records: ChunksExact<'a, u8>,
    trailing: bool,
}

impl Iterator for Runs<'_> {
    type Item = Result<Run>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next() {
            Some(record) => Some(Run::from_wire([record[0], record[1]])),
            None if self.trailing => {
                self.trailing = false;
                Some(Err(RunlenError::InvalidFormat(
                    "encoded stream ends with a partial record",
                )))
            }
            None => None,
        }
    }
}
