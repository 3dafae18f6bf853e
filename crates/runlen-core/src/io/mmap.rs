use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};

use crate::RunlenError;
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{ChunkData, Result};

const PROFILE_TAG_STACK_MMAP: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_MMAP];

/// Read-only memory-mapped view of one input file.
///
/// The mapping is shared through an `Arc`, so chunk views handed to workers
/// keep it alive after the `MmapInput` itself is dropped. Zero-length files
/// are not mapped at all and expose an empty view.
///
/// # Example
/// ```no_run
/// use runlen_core::MmapInput;
/// use std::path::Path;
///
/// let input = MmapInput::open(Path::new("data.bin"))?;
/// assert_eq!(input.data().len(), input.len());
/// # Ok::<(), runlen_core::RunlenError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MmapInput {
    mmap: Option<Arc<Mmap>>,
    path: PathBuf,
    len: u64,
}

impl MmapInput {
    /// Opens and maps `path`.
    ///
    /// # Errors
    /// Returns [`RunlenError::Open`] naming the path if the file cannot be
    /// opened, inspected or mapped.
    pub fn open(path: &Path) -> Result<Self> {
        let started_at = Instant::now();
        let result = Self::map(path).map_err(|source| RunlenError::Open {
            path: path.to_path_buf(),
            source,
        });

        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_MMAP_OPEN_COUNT,
            1,
            &[("subsystem", "mmap"), ("op", "open")],
        );
        telemetry::record_histogram(
            tags::METRIC_MMAP_OPEN_LATENCY_US,
            elapsed_us,
            &[("subsystem", "mmap"), ("op", "open")],
        );

        match &result {
            Ok(input) => {
                profile::event(
                    tags::PROFILE_MMAP,
                    &PROFILE_TAG_STACK_MMAP,
                    "open",
                    "ok",
                    elapsed_us,
                    "mmap open completed",
                );
                tracing::trace!(
                    target: tags::PROFILE_MMAP,
                    path = %path.display(),
                    len = input.len,
                    "mapped input"
                );
            }
            Err(error) => {
                profile::event(
                    tags::PROFILE_MMAP,
                    &PROFILE_TAG_STACK_MMAP,
                    "open",
                    "error",
                    elapsed_us,
                    "mmap open failed",
                );
                tracing::debug!(target: tags::PROFILE_MMAP, %error, "failed to map input");
            }
        }

        result
    }

    fn map(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: mapped read-only; the file must not be truncated while mapped.
            Some(Arc::new(unsafe { MmapOptions::new().map(&file)? }))
        };

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_u64(&self) -> u64 {
        self.len
    }

    /// Returns the file length as a usize, clamped to `usize::MAX`.
    pub fn len(&self) -> usize {
        self.len.min(usize::MAX as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a zero-copy view of the whole file.
    pub fn data(&self) -> ChunkData {
        match &self.mmap {
            Some(map) => ChunkData::Mapped {
                map: Arc::clone(map),
                start: 0,
                end: map.len(),
            },
            None => ChunkData::Owned(Bytes::new()),
        }
    }

    /// Returns a zero-copy view of `start..end`.
    ///
    /// # Errors
    /// Returns an error if the range is inverted or past the end of the file.
    pub fn mapped_slice(&self, start: usize, end: usize) -> Result<ChunkData> {
        self.data().slice(start, end)
    }
}

/// Maps every path in order, failing on the first one that cannot be mapped.
pub fn open_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<MmapInput>> {
    paths
        .iter()
        .map(|path| MmapInput::open(path.as_ref()))
        .collect()
}
