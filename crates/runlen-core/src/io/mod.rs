pub mod mmap;
pub mod partitioner;

pub use mmap::{MmapInput, open_inputs};
pub use partitioner::{ChunkPartitioner, ChunkPlan, DEFAULT_CHUNK_SIZE};
