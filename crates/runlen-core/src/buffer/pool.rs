use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;

const PROFILE_TAG_STACK_BUFFER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_BUFFER];
const LABELS_ACQUIRE: &[(&str, &str)] = &[("subsystem", "buffer"), ("op", "acquire")];
const LABELS_RECYCLE: &[(&str, &str)] = &[("subsystem", "buffer"), ("op", "recycle")];

/// Recycles the output buffers of encoded fragments.
///
/// A worker takes one buffer per chunk; the emitter drops the fragment once
/// it is written, and the allocation goes back to the idle queue. At most
/// `max_buffers` idle buffers are retained, anything beyond that is freed.
///
/// # Example
/// ```
/// use runlen_core::BufferPool;
///
/// let pool = BufferPool::new(8192, 16);
/// let mut buffer = pool.acquire_with_capacity(8192);
/// buffer.extend_from_slice(b"a\x01");
/// drop(buffer);
/// assert_eq!(pool.acquire().len(), 0);
/// assert_eq!(pool.metrics().recycled, 1);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    idle_tx: Sender<Vec<u8>>,
    idle_rx: Receiver<Vec<u8>>,
    default_capacity: usize,
    max_buffers: usize,
    counters: Arc<PoolCounters>,
}

impl BufferPool {
    /// `default_capacity` sizes fresh allocations; `max_buffers` caps the
    /// idle queue and is raised to one if zero.
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let (idle_tx, idle_rx) = bounded(max_buffers);
        Self {
            idle_tx,
            idle_rx,
            default_capacity,
            max_buffers,
            counters: Arc::default(),
        }
    }

    /// Takes an empty buffer with at least the default capacity.
    pub fn acquire(&self) -> PooledBuffer {
        self.acquire_with_capacity(self.default_capacity)
    }

    /// Takes an empty buffer able to hold `capacity` bytes without growing.
    pub fn acquire_with_capacity(&self, capacity: usize) -> PooledBuffer {
        let started_at = Instant::now();

        let (buffer, source) = match self.take_idle() {
            Some(buffer) => (buffer, "recycled"),
            None => (self.allocate(capacity), "created"),
        };
        let mut buffer = buffer;
        buffer.reserve(capacity);

        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::record_histogram(tags::METRIC_BUFFER_ACQUIRE_LATENCY_US, elapsed_us, LABELS_ACQUIRE);
        profile::event(
            tags::PROFILE_BUFFER,
            &PROFILE_TAG_STACK_BUFFER,
            "acquire",
            source,
            elapsed_us,
            "fragment buffer acquired",
        );

        PooledBuffer {
            buffer,
            idle_tx: self.idle_tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    fn take_idle(&self) -> Option<Vec<u8>> {
        let mut buffer = self.idle_rx.try_recv().ok()?;
        buffer.clear();
        self.counters.recycled.fetch_add(1, Ordering::Relaxed);
        telemetry::increment_counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT, 1, LABELS_ACQUIRE);
        Some(buffer)
    }

    fn allocate(&self, capacity: usize) -> Vec<u8> {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        telemetry::increment_counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT, 1, LABELS_ACQUIRE);
        Vec::with_capacity(capacity.max(self.default_capacity))
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.counters.snapshot()
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

/// Allocation counters of a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    /// Fresh allocations.
    pub created: usize,
    /// Acquisitions served from the idle queue.
    pub recycled: usize,
    /// Buffers freed on drop because the idle queue was full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

impl PoolCounters {
    fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Byte buffer on loan from a [`BufferPool`]; goes back to the idle queue on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    idle_tx: Sender<Vec<u8>>,
    counters: Arc<PoolCounters>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let metric = match self.idle_tx.try_send(buffer) {
            Ok(()) => tags::METRIC_BUFFER_RECYCLE_OK_COUNT,
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT
            }
        };
        telemetry::increment_counter(metric, 1, LABELS_RECYCLE);
    }
}
