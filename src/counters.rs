//! Read-only access to the driver's counter values.
//!
//! The driver allocates counter ids and publishes values into the control
//! file's counter-values region, one cache-line slot per counter with the
//! value in the first eight bytes. Counter availability handlers receive a
//! [`CountersReader`] so they can observe values without further mapping.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::control::{COUNTER_SLOT_SIZE, ControlFile};
use crate::region::Region;

/// Read-only view over the counter-values region.
pub struct CountersReader {
    values: Region,
    max_counters: u32,
    /// Keeps the mapping alive for the region view
    _control: Arc<ControlFile>,
}

impl CountersReader {
    pub fn new(control: Arc<ControlFile>) -> Self {
        Self {
            values: control.counter_values_region(),
            max_counters: control.max_counters(),
            _control: control,
        }
    }

    /// Highest counter id this reader can address.
    #[inline]
    pub fn max_counter_id(&self) -> i32 {
        self.max_counters as i32 - 1
    }

    /// Byte offset of a counter's value slot.
    #[inline]
    pub fn counter_offset(counter_id: i32) -> usize {
        counter_id as usize * COUNTER_SLOT_SIZE
    }

    /// Current value of a counter, or `None` if the id is out of range.
    pub fn counter_value(&self, counter_id: i32) -> Option<i64> {
        if counter_id < 0 || counter_id >= self.max_counters as i32 {
            return None;
        }
        let value = self
            .values
            .atomic_i64_at(Self::counter_offset(counter_id))
            .load(Ordering::Acquire);
        Some(value)
    }
}
