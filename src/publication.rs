//! Publication handles.
//!
//! Handles returned by `add_publication` / `add_exclusive_publication`. The
//! data-plane write path over the mapped log is independent of the conductor;
//! these handles expose identity, the backing log buffers, and `close()`
//! routed back through the conductor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::buffers::LogBuffers;
use crate::conductor::ClientConductor;
use crate::error::Result;

macro_rules! publication_impl {
    ($name:ident) => {
        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub(crate) fn new(
                conductor: Weak<ClientConductor>,
                channel: String,
                stream_id: i32,
                session_id: i32,
                original_registration_id: i64,
                registration_id: i64,
                publication_limit_id: i32,
                channel_status_id: i32,
                log_buffers: Arc<LogBuffers>,
            ) -> Self {
                Self {
                    conductor,
                    channel,
                    stream_id,
                    session_id,
                    original_registration_id,
                    registration_id,
                    publication_limit_id,
                    channel_status_id,
                    log_buffers,
                    closed: AtomicBool::new(false),
                }
            }

            #[inline]
            pub fn channel(&self) -> &str {
                &self.channel
            }

            #[inline]
            pub fn stream_id(&self) -> i32 {
                self.stream_id
            }

            #[inline]
            pub fn session_id(&self) -> i32 {
                self.session_id
            }

            /// Registration id of the first add that created the underlying
            /// log; stable across rebinds.
            #[inline]
            pub fn original_registration_id(&self) -> i64 {
                self.original_registration_id
            }

            /// Registration id of this handle in the conductor's registry.
            #[inline]
            pub fn registration_id(&self) -> i64 {
                self.registration_id
            }

            #[inline]
            pub fn publication_limit_id(&self) -> i32 {
                self.publication_limit_id
            }

            #[inline]
            pub fn channel_status_id(&self) -> i32 {
                self.channel_status_id
            }

            #[inline]
            pub fn log_buffers(&self) -> &Arc<LogBuffers> {
                &self.log_buffers
            }

            #[inline]
            pub fn is_closed(&self) -> bool {
                self.closed.load(Ordering::Acquire)
            }

            /// Mark closed without a driver round-trip. Returns the previous
            /// value, so a second close can short-circuit.
            pub(crate) fn set_closed(&self) -> bool {
                self.closed.swap(true, Ordering::AcqRel)
            }
        }
    };
}

/// A publication that may be shared by several writer threads.
pub struct Publication {
    conductor: Weak<ClientConductor>,
    channel: String,
    stream_id: i32,
    session_id: i32,
    original_registration_id: i64,
    registration_id: i64,
    publication_limit_id: i32,
    channel_status_id: i32,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("channel", &self.channel)
            .field("stream_id", &self.stream_id)
            .field("session_id", &self.session_id)
            .field("registration_id", &self.registration_id)
            .finish()
    }
}

publication_impl!(Publication);

impl Publication {
    /// Release this publication: remove it from the conductor and tell the
    /// driver. A second call is a no-op.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        match self.conductor.upgrade() {
            Some(conductor) => conductor.release_publication(self),
            None => Ok(()),
        }
    }
}

/// A publication with a single exclusive writer.
pub struct ExclusivePublication {
    conductor: Weak<ClientConductor>,
    channel: String,
    stream_id: i32,
    session_id: i32,
    original_registration_id: i64,
    registration_id: i64,
    publication_limit_id: i32,
    channel_status_id: i32,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

publication_impl!(ExclusivePublication);

impl ExclusivePublication {
    /// Release this publication: remove it from the conductor and tell the
    /// driver. A second call is a no-op.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        match self.conductor.upgrade() {
            Some(conductor) => conductor.release_exclusive_publication(self),
            None => Ok(()),
        }
    }
}
