use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;

use crate::buffer::PooledBuffer;
use crate::error::RunlenError;

pub type Result<T> = std::result::Result<T, RunlenError>;

/// Size in bytes of one `(symbol, count)` record on the wire.
pub const RUN_WIRE_SIZE: usize = 2;

/// One `(symbol, count)` record of the encoded stream.
///
/// `count` is always in `1..=255`; a longer run of the same byte is written
/// as several consecutive records with the same symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Run {
    pub symbol: u8,
    pub count: u8,
}

impl Run {
    /// Largest count a single record can carry.
    pub const MAX_COUNT: u8 = u8::MAX;

    pub fn new(symbol: u8, count: u8) -> Self {
        Self { symbol, count }
    }

    /// Decodes a record from its two wire bytes.
    ///
    /// # Errors
    /// Returns an error if the count byte is zero.
    pub fn from_wire(bytes: [u8; RUN_WIRE_SIZE]) -> Result<Self> {
        if bytes[1] == 0 {
            return Err(RunlenError::InvalidFormat("run count must be non-zero"));
        }

        Ok(Self::new(bytes[0], bytes[1]))
    }

    pub fn to_wire(self) -> [u8; RUN_WIRE_SIZE] {
        [self.symbol, self.count]
    }
}

/// Read-only bytes of an input, or of one chunk of an input.
#[derive(Debug, Clone)]
pub enum ChunkData {
    Owned(Bytes),
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        end: usize,
    },
}

impl ChunkData {
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(data) => data.len(),
            Self::Mapped { start, end, .. } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => &data[..],
            Self::Mapped { map, start, end } => &map[*start..*end],
        }
    }

    /// Returns a sub-range of this view without copying.
    ///
    /// `start` and `end` are relative to this view.
    ///
    /// # Errors
    /// Returns an error if the range is inverted or exceeds the view.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(RunlenError::InvalidFormat("invalid chunk slice range"));
        }

        match self {
            Self::Owned(data) => Ok(Self::Owned(data.slice(start..end))),
            Self::Mapped { map, start: base, .. } => Ok(Self::Mapped {
                map: Arc::clone(map),
                start: base + start,
                end: base + end,
            }),
        }
    }
}

impl From<Bytes> for ChunkData {
    fn from(data: Bytes) -> Self {
        Self::Owned(data)
    }
}

impl From<Vec<u8>> for ChunkData {
    fn from(data: Vec<u8>) -> Self {
        Self::Owned(Bytes::from(data))
    }
}

impl From<&'static [u8]> for ChunkData {
    fn from(data: &'static [u8]) -> Self {
        Self::Owned(Bytes::from_static(data))
    }
}

/// A contiguous slice of one input, assigned one ordinal of the global order.
///
/// Tasks are created by the partitioner with dense ids starting at zero:
/// first by input order, then by chunk order within each input.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: usize,
    pub input_index: usize,
    pub data: ChunkData,
}

impl Task {
    pub fn new(id: usize, input_index: usize, data: ChunkData) -> Self {
        Self {
            id,
            input_index,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

/// Encoded pairs of a single task, produced with a fresh codec state.
#[derive(Debug)]
pub struct Fragment {
    pub task_id: usize,
    pub input_index: usize,
    pub input_len: usize,
    pub bytes: PooledBuffer,
}

impl Fragment {
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Number of `(symbol, count)` records in this fragment.
    pub fn run_count(&self) -> usize {
        self.bytes.len() / RUN_WIRE_SIZE
    }
}
