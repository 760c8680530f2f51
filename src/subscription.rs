//! Subscription and image handles.
//!
//! A subscription owns the list of images currently delivering from remote
//! sources. The conductor mutates the image list under its own lock as
//! availability events arrive; pollers read it concurrently, so the list sits
//! behind a read-write lock.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::buffers::LogBuffers;
use crate::conductor::ClientConductor;
use crate::context::{AvailableImageHandler, UnavailableImageHandler};
use crate::error::Result;

/// Channel-status id before the driver has assigned one.
pub const NO_CHANNEL_STATUS_ID: i32 = -1;

/// A per-source read position under a subscription.
pub struct Image {
    correlation_id: i64,
    session_id: i32,
    subscription_registration_id: i64,
    subscriber_position_id: i32,
    source_identity: String,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

impl Image {
    pub(crate) fn new(
        correlation_id: i64,
        session_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        source_identity: String,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            correlation_id,
            session_id,
            subscription_registration_id,
            subscriber_position_id,
            source_identity,
            log_buffers,
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    #[inline]
    pub fn subscription_registration_id(&self) -> i64 {
        self.subscription_registration_id
    }

    #[inline]
    pub fn subscriber_position_id(&self) -> i32 {
        self.subscriber_position_id
    }

    #[inline]
    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    #[inline]
    pub fn log_buffers(&self) -> &Arc<LogBuffers> {
        &self.log_buffers
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A subscription for a channel and stream id.
pub struct Subscription {
    conductor: Weak<ClientConductor>,
    channel: String,
    stream_id: i32,
    registration_id: i64,
    channel_status_id: AtomicI32,
    images: RwLock<Vec<Arc<Image>>>,
    available_image_handler: AvailableImageHandler,
    unavailable_image_handler: UnavailableImageHandler,
    closed: AtomicBool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("stream_id", &self.stream_id)
            .field("registration_id", &self.registration_id)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        conductor: Weak<ClientConductor>,
        channel: String,
        stream_id: i32,
        registration_id: i64,
        available_image_handler: AvailableImageHandler,
        unavailable_image_handler: UnavailableImageHandler,
    ) -> Self {
        Self {
            conductor,
            channel,
            stream_id,
            registration_id,
            channel_status_id: AtomicI32::new(NO_CHANNEL_STATUS_ID),
            images: RwLock::new(Vec::new()),
            available_image_handler,
            unavailable_image_handler,
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
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Channel-status counter id, or [`NO_CHANNEL_STATUS_ID`] until the
    /// driver assigns one.
    #[inline]
    pub fn channel_status_id(&self) -> i32 {
        self.channel_status_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_channel_status_id(&self, id: i32) {
        self.channel_status_id.store(id, Ordering::Release);
    }

    /// Number of images currently delivering to this subscription.
    pub fn image_count(&self) -> usize {
        self.images.read().len()
    }

    /// Snapshot of the current images.
    pub fn images(&self) -> Vec<Arc<Image>> {
        self.images.read().clone()
    }

    /// Whether an image with this correlation id is present.
    pub fn has_image(&self, correlation_id: i64) -> bool {
        self.images
            .read()
            .iter()
            .any(|image| image.correlation_id() == correlation_id)
    }

    /// Whether any source is currently connected.
    pub fn is_connected(&self) -> bool {
        !self.images.read().is_empty()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn available_image_handler(&self) -> &AvailableImageHandler {
        &self.available_image_handler
    }

    pub(crate) fn unavailable_image_handler(&self) -> &UnavailableImageHandler {
        &self.unavailable_image_handler
    }

    pub(crate) fn add_image(&self, image: Arc<Image>) {
        self.images.write().push(image);
    }

    pub(crate) fn remove_image(&self, correlation_id: i64) -> Option<Arc<Image>> {
        let mut images = self.images.write();
        let index = images
            .iter()
            .position(|image| image.correlation_id() == correlation_id)?;
        Some(images.swap_remove(index))
    }

    /// Drain all images, e.g. when the subscription is released.
    pub(crate) fn take_images(&self) -> Vec<Arc<Image>> {
        std::mem::take(&mut *self.images.write())
    }

    /// Mark closed without a driver round-trip. Returns the previous value,
    /// so a second close can short-circuit.
    pub(crate) fn set_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    /// Release this subscription: remove it and its images from the
    /// conductor and tell the driver. A second call is a no-op.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        match self.conductor.upgrade() {
            Some(conductor) => conductor.release_subscription(self),
            None => Ok(()),
        }
    }
}
