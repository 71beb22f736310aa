//! Chunk lifecycle and raw-access statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of chunk manager activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Chunks given storage (plain and reserved creates)
    pub chunks_created: u64,
    /// Chunks removed
    pub chunks_removed: u64,
    /// Ids handed out by `reserve`
    pub ids_reserved: u64,
    /// Reserved ids later consumed by a create
    pub reserved_consumed: u64,
    /// Successful pins
    pub pins: u64,
    /// Bytes read through the handle path
    pub bytes_read: u64,
    /// Bytes written through the handle path
    pub bytes_written: u64,
    /// Create requests the service could not satisfy
    pub create_failures: u64,
}

impl ChunkStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Chunks currently holding storage
    pub fn live_chunks(&self) -> u64 {
        self.chunks_created.saturating_sub(self.chunks_removed)
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "ChunkStats {{ live: {}, created: {}, removed: {}, reserved: {}, \
             pins: {}, read: {}B, written: {}B, failures: {} }}",
            self.live_chunks(),
            self.chunks_created,
            self.chunks_removed,
            self.ids_reserved,
            self.pins,
            self.bytes_read,
            self.bytes_written,
            self.create_failures
        )
    }
}

/// Thread-safe counters behind [`ChunkStats`]
#[derive(Debug, Default)]
pub struct AtomicChunkStats {
    chunks_created: AtomicU64,
    chunks_removed: AtomicU64,
    ids_reserved: AtomicU64,
    reserved_consumed: AtomicU64,
    pins: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    create_failures: AtomicU64,
}

impl AtomicChunkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_create(&self, from_reservation: bool) {
        self.chunks_created.fetch_add(1, Ordering::Relaxed);
        if from_reservation {
            self.reserved_consumed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_create_failure(&self) {
        self.create_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.chunks_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reserve(&self, count: u64) {
        self.ids_reserved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_pin(&self) {
        self.pins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> ChunkStats {
        ChunkStats {
            chunks_created: self.chunks_created.load(Ordering::Relaxed),
            chunks_removed: self.chunks_removed.load(Ordering::Relaxed),
            ids_reserved: self.ids_reserved.load(Ordering::Relaxed),
            reserved_consumed: self.reserved_consumed.load(Ordering::Relaxed),
            pins: self.pins.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
        }
    }
}
