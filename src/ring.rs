//! SPSC record ring over a shared region.
//!
//! Both control channels (client → driver commands, driver → client events)
//! use the same layout: a [`RingHeader`] with the producer and consumer
//! positions on separate cache lines, followed by a power-of-two data section.
//! Each record is an 8-byte `(length, type)` header plus the payload, padded
//! to an 8-byte boundary. Records never wrap: when a record does not fit
//! before the end of the buffer, a padding record fills the gap and the
//! record is written at the start.
//!
//! All values are native-endian.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::region::Region;

/// Size of [`RingHeader`] in bytes.
pub const RING_HEADER_SIZE: usize = 128;

/// Size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Record type used to fill the gap before the buffer end on wrap.
pub const PADDING_RECORD_TYPE: i32 = -1;

/// Ring state at the start of the ring region.
///
/// Producer and consumer positions are free-running byte offsets; the data
/// index is the position masked by `capacity - 1`.
#[repr(C)]
pub struct RingHeader {
    /// Byte position up to which the producer has published records
    pub producer_position: AtomicU64,
    _pad1: [u8; 56],
    /// Byte position up to which the consumer has released records
    pub consumer_position: AtomicU64,
    _pad2: [u8; 56],
}

const _: () = assert!(size_of::<RingHeader>() == RING_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct RecordHeader {
    /// Payload length in bytes (excludes this header and alignment padding)
    length: u32,
    /// Record type; `PADDING_RECORD_TYPE` marks wrap filler
    record_type: i32,
}

const _: () = assert!(size_of::<RecordHeader>() == RECORD_HEADER_SIZE);

/// Error writing a record to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingWriteError {
    /// Not enough free space for the record
    Full,
    /// Payload exceeds the maximum record size for this ring
    TooLarge,
}

impl std::fmt::Display for RingWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingWriteError::Full => write!(f, "ring is full"),
            RingWriteError::TooLarge => write!(f, "record exceeds maximum size"),
        }
    }
}

impl std::error::Error for RingWriteError {}

#[inline]
const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn split_ring(region: Region) -> (Region, Region, u64) {
    assert!(
        region.len() > RING_HEADER_SIZE,
        "ring region too small: {} bytes",
        region.len()
    );
    let capacity = region.len() - RING_HEADER_SIZE;
    assert!(
        capacity.is_power_of_two(),
        "ring capacity must be a power of two, got {capacity}"
    );
    let header = region.subregion(0, RING_HEADER_SIZE);
    let buf = region.subregion(RING_HEADER_SIZE, capacity);
    (header, buf, capacity as u64)
}

/// Producer half of a record ring. Only one may exist per ring.
pub struct RingProducer {
    header: Region,
    buf: Region,
    capacity: u64,
    mask: u64,
}

impl RingProducer {
    /// # Safety
    ///
    /// - `region` must cover a valid, initialized ring (header + data) that
    ///   outlives the producer
    /// - there must be no other producer for this ring
    pub unsafe fn from_region(region: Region) -> Self {
        let (header, buf, capacity) = split_ring(region);
        RingProducer {
            header,
            buf,
            capacity,
            mask: capacity - 1,
        }
    }

    fn header(&self) -> &RingHeader {
        unsafe { &*(self.header.as_ptr() as *const RingHeader) }
    }

    /// Maximum payload size accepted by [`write`](Self::write).
    #[inline]
    pub fn max_payload(&self) -> usize {
        (self.capacity / 8) as usize
    }

    /// Write one record. Returns an error if the ring has no space or the
    /// payload exceeds [`max_payload`](Self::max_payload).
    pub fn write(&mut self, record_type: i32, payload: &[u8]) -> Result<(), RingWriteError> {
        if payload.len() > self.max_payload() {
            return Err(RingWriteError::TooLarge);
        }

        let record_len = align8(RECORD_HEADER_SIZE + payload.len());
        let tail = self.header().producer_position.load(Ordering::Relaxed);
        let head = self.header().consumer_position.load(Ordering::Acquire);
        let available = self.capacity - (tail - head);

        let index = (tail & self.mask) as usize;
        let to_end = self.capacity as usize - index;
        let needed = if record_len > to_end {
            to_end + record_len
        } else {
            record_len
        };

        if needed as u64 > available {
            return Err(RingWriteError::Full);
        }

        let mut new_tail = tail;
        let mut write_index = index;
        if record_len > to_end {
            // Positions advance in multiples of 8, so at least a record
            // header fits before the end.
            self.put_header(
                index,
                RecordHeader {
                    length: (to_end - RECORD_HEADER_SIZE) as u32,
                    record_type: PADDING_RECORD_TYPE,
                },
            );
            new_tail += to_end as u64;
            write_index = 0;
        }

        self.put_header(
            write_index,
            RecordHeader {
                length: payload.len() as u32,
                record_type,
            },
        );
        let body =
            unsafe { self.buf.bytes_mut(write_index + RECORD_HEADER_SIZE, payload.len()) };
        body.copy_from_slice(payload);
        new_tail += record_len as u64;

        // Publish: record writes complete before the consumer sees the new tail
        self.header()
            .producer_position
            .store(new_tail, Ordering::Release);
        Ok(())
    }

    fn put_header(&mut self, index: usize, record: RecordHeader) {
        // Record offsets are 8-aligned within an 8-aligned buffer.
        unsafe {
            std::ptr::write(self.buf.as_ptr().add(index) as *mut RecordHeader, record);
        }
    }
}

/// Consumer half of a record ring. Only one may exist per ring.
pub struct RingConsumer {
    header: Region,
    buf: Region,
    capacity: u64,
    mask: u64,
}

impl RingConsumer {
    /// # Safety
    ///
    /// - `region` must cover a valid, initialized ring (header + data) that
    ///   outlives the consumer
    /// - there must be no other consumer for this ring
    pub unsafe fn from_region(region: Region) -> Self {
        let (header, buf, capacity) = split_ring(region);
        RingConsumer {
            header,
            buf,
            capacity,
            mask: capacity - 1,
        }
    }

    fn header(&self) -> &RingHeader {
        unsafe { &*(self.header.as_ptr() as *const RingHeader) }
    }

    /// Read up to `limit` records, invoking `handler` with each record's type
    /// and payload. Returns the number of records consumed (padding excluded).
    ///
    /// A record with an impossible length means the producer is corrupt; the
    /// remaining bytes are dropped and the consumer resynchronizes at the
    /// producer position.
    pub fn read<F>(&mut self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(i32, &[u8]),
    {
        let header = self.header();
        let head = header.consumer_position.load(Ordering::Relaxed);
        let tail = header.producer_position.load(Ordering::Acquire);

        let mut pos = head;
        let mut count = 0;

        while pos < tail && count < limit {
            let index = (pos & self.mask) as usize;
            let record = unsafe {
                std::ptr::read(self.buf.as_ptr().add(index) as *const RecordHeader)
            };
            let record_len = align8(RECORD_HEADER_SIZE + record.length as usize);

            if record_len > self.capacity as usize || pos + record_len as u64 > tail {
                tracing::warn!(
                    dropped = tail - pos,
                    "malformed record in ring, resynchronizing at producer position"
                );
                pos = tail;
                break;
            }

            if record.record_type != PADDING_RECORD_TYPE {
                let payload = unsafe {
                    self.buf
                        .bytes(index + RECORD_HEADER_SIZE, record.length as usize)
                };
                handler(record.record_type, payload);
                count += 1;
            }

            pos += record_len as u64;
        }

        // Release consumed space back to the producer
        header.consumer_position.store(pos, Ordering::Release);
        count
    }

    /// Check whether any unread records are pending.
    pub fn is_empty(&self) -> bool {
        let header = self.header();
        let head = header.consumer_position.load(Ordering::Relaxed);
        let tail = header.producer_position.load(Ordering::Acquire);
        head == tail
    }
}
