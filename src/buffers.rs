//! Log buffers: the memory-mapped log files behind publications and images.
//!
//! The conductor owns a registry of `registrationId → LogBuffers` and a
//! refcount per entry. The refcount and last-state-change timestamp live
//! here; both are mutated only under the conductor lock. When the refcount
//! reaches zero the entry leaves the registry and lingers before the final
//! reference is dropped, which is when the mapping is actually unmapped.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::region::{FileRegion, HeapRegion, Region};

enum LogBacking {
    /// File-backed mmap (production)
    File(FileRegion),
    /// Heap memory (tests)
    Heap(HeapRegion),
}

/// A mapped log file with the conductor's sharing bookkeeping.
pub struct LogBuffers {
    backing: LogBacking,
    /// Number of registered sharers; mutated only under the conductor lock
    refcount: AtomicI64,
    /// Monotonic ns of the last refcount transition to zero
    last_state_change_ns: AtomicU64,
}

impl LogBuffers {
    /// Map an existing log file.
    pub fn map(path: &Path) -> io::Result<Arc<Self>> {
        let backing = FileRegion::attach(path)?;
        Ok(Arc::new(Self {
            backing: LogBacking::File(backing),
            refcount: AtomicI64::new(0),
            last_state_change_ns: AtomicU64::new(0),
        }))
    }

    /// Heap-backed log buffers for tests.
    pub fn heap(len: usize) -> Arc<Self> {
        Arc::new(Self {
            backing: LogBacking::Heap(HeapRegion::new_zeroed(len)),
            refcount: AtomicI64::new(0),
            last_state_change_ns: AtomicU64::new(0),
        })
    }

    /// View of the mapped log.
    pub fn region(&self) -> Region {
        match &self.backing {
            LogBacking::File(f) => f.region(),
            LogBacking::Heap(h) => h.region(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.region().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Increment the sharer count, returning the new value.
    pub(crate) fn incr_ref(&self) -> i64 {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the sharer count, returning the new value.
    pub(crate) fn decr_ref(&self) -> i64 {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }

    #[inline]
    pub fn time_of_last_state_change_ns(&self) -> u64 {
        self.last_state_change_ns.load(Ordering::Acquire)
    }

    pub(crate) fn set_time_of_last_state_change_ns(&self, now_ns: u64) {
        self.last_state_change_ns.store(now_ns, Ordering::Release);
    }
}

/// Maps a log file name to [`LogBuffers`].
pub trait LogBuffersFactory: Send + Sync {
    fn map_log_file(&self, log_file: &str) -> io::Result<Arc<LogBuffers>>;
}

/// Default factory: maps the named file from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct MappedLogBuffersFactory;

impl LogBuffersFactory for MappedLogBuffersFactory {
    fn map_log_file(&self, log_file: &str) -> io::Result<Arc<LogBuffers>> {
        LogBuffers::map(Path::new(log_file))
    }
}
