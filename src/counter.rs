//! Counter handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::conductor::ClientConductor;
use crate::counters::CountersReader;
use crate::error::Result;

/// A client-allocated counter backed by a driver counter slot.
pub struct Counter {
    conductor: Weak<ClientConductor>,
    registration_id: i64,
    counter_id: i32,
    reader: Arc<CountersReader>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter")
            .field("registration_id", &self.registration_id)
            .field("counter_id", &self.counter_id)
            .finish()
    }
}

impl Counter {
    pub(crate) fn new(
        conductor: Weak<ClientConductor>,
        registration_id: i64,
        counter_id: i32,
        reader: Arc<CountersReader>,
    ) -> Self {
        Self {
            conductor,
            registration_id,
            counter_id,
            reader,
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Driver-allocated counter id.
    #[inline]
    pub fn counter_id(&self) -> i32 {
        self.counter_id
    }

    /// Current counter value, or `None` if the id is out of range.
    pub fn value(&self) -> Option<i64> {
        self.reader.counter_value(self.counter_id)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed without a driver round-trip. Returns the previous value,
    /// so a second close can short-circuit.
    pub(crate) fn set_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    /// Release this counter: remove it from the conductor and tell the
    /// driver. A second call is a no-op.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        match self.conductor.upgrade() {
            Some(conductor) => conductor.release_counter(self),
            None => Ok(()),
        }
    }
}
