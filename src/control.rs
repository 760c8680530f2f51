//! The control file: the rendezvous point between client and driver.
//!
//! A single memory-mapped file in the well-known driver directory, laid out
//! as: header, command ring (client → driver), event ring (driver → client),
//! counter values. The header carries the driver's wall-clock heartbeat and
//! the shared correlation-id counter from which every client allocates.

use std::io;
use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::region::{FileRegion, HeapRegion, Region};
use crate::ring::RING_HEADER_SIZE;

/// File name of the control file inside the driver directory.
pub const CONTROL_FILE_NAME: &str = "control.dat";

/// Magic bytes identifying a control file.
pub const MAGIC: [u8; 8] = *b"COURSER\x01";

/// Control file format version.
pub const VERSION: u32 = 1;

/// Control header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Size of one counter-value slot (a cache line).
pub const COUNTER_SLOT_SIZE: usize = 64;

/// Header at the start of the control file.
#[repr(C)]
pub struct ControlHeader {
    /// Magic bytes: "COURSER\x01"
    pub magic: [u8; 8],
    /// Format version (1)
    pub version: u32,
    /// Size of this header (128)
    pub header_size: u32,
    /// Command ring data capacity in bytes (power of 2)
    pub command_ring_capacity: u32,
    /// Event ring data capacity in bytes (power of 2)
    pub event_ring_capacity: u32,
    /// Number of counter-value slots
    pub max_counters: u32,
    /// Reserved (zero)
    pub _pad: u32,
    /// Wall-clock ms of the driver's last keepalive, written by the driver
    pub driver_heartbeat_ms: AtomicI64,
    /// Shared correlation-id counter; clients allocate with fetch_add
    pub next_correlation_id: AtomicI64,
    /// Reserved for future use (zero)
    pub reserved: [u8; 80],
}

const _: () = assert!(size_of::<ControlHeader>() == HEADER_SIZE);

impl ControlHeader {
    /// Returns `true` if magic and version are correct.
    pub fn validate(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION && self.header_size == HEADER_SIZE as u32
    }
}

/// Configuration for creating a new control file.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Command ring data capacity in bytes (power of 2)
    pub command_ring_capacity: u32,
    /// Event ring data capacity in bytes (power of 2)
    pub event_ring_capacity: u32,
    /// Number of counter-value slots
    pub max_counters: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            command_ring_capacity: 64 * 1024,
            event_ring_capacity: 64 * 1024,
            max_counters: 256,
        }
    }
}

impl ControlConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.command_ring_capacity.is_power_of_two() {
            return Err("command_ring_capacity must be power of 2");
        }
        if !self.event_ring_capacity.is_power_of_two() {
            return Err("event_ring_capacity must be power of 2");
        }
        if self.command_ring_capacity < 1024 || self.event_ring_capacity < 1024 {
            return Err("ring capacity must be at least 1024");
        }
        if self.max_counters == 0 {
            return Err("max_counters must be > 0");
        }
        Ok(())
    }
}

/// Computed layout of a control file. All offsets are cache-line aligned.
#[derive(Debug, Clone)]
pub struct ControlLayout {
    pub command_ring_offset: usize,
    pub command_ring_size: usize,
    pub event_ring_offset: usize,
    pub event_ring_size: usize,
    pub counter_values_offset: usize,
    pub counter_values_size: usize,
    pub total_size: usize,
}

impl ControlLayout {
    fn new(config: &ControlConfig) -> Self {
        let command_ring_offset = align_up(HEADER_SIZE, 64);
        let command_ring_size = RING_HEADER_SIZE + config.command_ring_capacity as usize;
        let event_ring_offset = align_up(command_ring_offset + command_ring_size, 64);
        let event_ring_size = RING_HEADER_SIZE + config.event_ring_capacity as usize;
        let counter_values_offset = align_up(event_ring_offset + event_ring_size, 64);
        let counter_values_size = config.max_counters as usize * COUNTER_SLOT_SIZE;
        let total_size = counter_values_offset + counter_values_size;

        Self {
            command_ring_offset,
            command_ring_size,
            event_ring_offset,
            event_ring_size,
            counter_values_offset,
            counter_values_size,
            total_size,
        }
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// Backing memory for a control file.
#[allow(dead_code)]
enum ControlBacking {
    /// Heap-allocated memory (for testing)
    Heap(HeapRegion),
    /// File-backed mmap (for cross-process use)
    File(FileRegion),
}

/// A mapped control file.
///
/// Created by the driver, attached by clients. Both sides hold it behind an
/// `Arc`; every ring producer/consumer and counters reader derives its region
/// views from here and keeps the `Arc` alive.
pub struct ControlFile {
    /// Backing memory (heap or mmap), kept alive for the region views
    #[allow(dead_code)]
    backing: ControlBacking,
    region: Region,
    max_counters: u32,
    layout: ControlLayout,
}

impl ControlFile {
    /// Create a control file at `path`. Driver side.
    pub fn create(path: &Path, config: ControlConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let layout = ControlLayout::new(&config);
        let backing = FileRegion::create(path, layout.total_size)?;
        let region = backing.region();
        Self::init_header(region, &config);

        Ok(Self {
            backing: ControlBacking::File(backing),
            region,
            max_counters: config.max_counters,
            layout,
        })
    }

    /// Create a heap-backed control file, for tests where both sides live in
    /// one process.
    pub fn create_heap(config: ControlConfig) -> Self {
        config.validate().expect("invalid control config");
        let layout = ControlLayout::new(&config);
        let backing = HeapRegion::new_zeroed(layout.total_size);
        let region = backing.region();
        Self::init_header(region, &config);

        Self {
            backing: ControlBacking::Heap(backing),
            region,
            max_counters: config.max_counters,
            layout,
        }
    }

    /// Attach to an existing control file. Client side.
    ///
    /// Validates the header and reconstructs the layout from it.
    pub fn attach(path: &Path) -> io::Result<Self> {
        let backing = FileRegion::attach(path)?;
        let region = backing.region();

        if region.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "control file smaller than header",
            ));
        }

        let header = unsafe { &*(region.as_ptr() as *const ControlHeader) };
        if !header.validate() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "control file header validation failed",
            ));
        }

        let config = ControlConfig {
            command_ring_capacity: header.command_ring_capacity,
            event_ring_capacity: header.event_ring_capacity,
            max_counters: header.max_counters,
        };
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let layout = ControlLayout::new(&config);
        if region.len() < layout.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "control file truncated",
            ));
        }

        Ok(Self {
            backing: ControlBacking::File(backing),
            region,
            max_counters: config.max_counters,
            layout,
        })
    }

    fn init_header(region: Region, config: &ControlConfig) {
        let header = unsafe { &mut *(region.as_ptr() as *mut ControlHeader) };
        header.magic = MAGIC;
        header.version = VERSION;
        header.header_size = HEADER_SIZE as u32;
        header.command_ring_capacity = config.command_ring_capacity;
        header.event_ring_capacity = config.event_ring_capacity;
        header.max_counters = config.max_counters;
    }

    #[inline]
    pub fn header(&self) -> &ControlHeader {
        unsafe { &*(self.region.as_ptr() as *const ControlHeader) }
    }

    #[inline]
    pub fn layout(&self) -> &ControlLayout {
        &self.layout
    }

    /// Region covering the command ring (header + data).
    pub fn command_ring_region(&self) -> Region {
        self.region
            .subregion(self.layout.command_ring_offset, self.layout.command_ring_size)
    }

    /// Region covering the event ring (header + data).
    pub fn event_ring_region(&self) -> Region {
        self.region
            .subregion(self.layout.event_ring_offset, self.layout.event_ring_size)
    }

    /// Region covering the counter values.
    pub fn counter_values_region(&self) -> Region {
        self.region.subregion(
            self.layout.counter_values_offset,
            self.layout.counter_values_size,
        )
    }

    #[inline]
    pub fn max_counters(&self) -> u32 {
        self.max_counters
    }

    /// Wall-clock ms of the driver's last keepalive.
    #[inline]
    pub fn driver_heartbeat_ms(&self) -> i64 {
        self.header().driver_heartbeat_ms.load(Ordering::Acquire)
    }

    /// Stamp the driver keepalive. Driver side.
    #[inline]
    pub fn set_driver_heartbeat_ms(&self, now_ms: i64) {
        self.header()
            .driver_heartbeat_ms
            .store(now_ms, Ordering::Release);
    }

    /// Allocate the next correlation id from the shared counter.
    #[inline]
    pub fn next_correlation_id(&self) -> i64 {
        self.header()
            .next_correlation_id
            .fetch_add(1, Ordering::AcqRel)
    }

    /// Peek the correlation id the next allocation will return.
    #[inline]
    pub fn peek_next_correlation_id(&self) -> i64 {
        self.header().next_correlation_id.load(Ordering::Acquire)
    }
}
