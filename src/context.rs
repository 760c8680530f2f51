//! Client configuration.
//!
//! A [`Context`] carries everything the conductor needs: the driver
//! directory, the clocks, the timeout intervals, the default callbacks, and
//! the log-buffers factory. Unset options fall back to defaults that match a
//! local driver on the same machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffers::{LogBuffersFactory, MappedLogBuffersFactory};
use crate::clock::{EpochClock, NanoClock, SystemEpochClock, SystemNanoClock};
use crate::control::CONTROL_FILE_NAME;
use crate::counters::CountersReader;
use crate::error::ClientError;
use crate::subscription::Image;

/// Sink for non-fatal errors observed by the conductor.
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Callback invoked when an image becomes available under a subscription.
pub type AvailableImageHandler = Arc<dyn Fn(&Image) + Send + Sync>;

/// Callback invoked when an image goes away.
pub type UnavailableImageHandler = Arc<dyn Fn(&Image) + Send + Sync>;

/// Callback invoked when a counter becomes available.
pub type AvailableCounterHandler = Arc<dyn Fn(&CountersReader, i64, i32) + Send + Sync>;

/// Callback invoked when a counter goes away.
pub type UnavailableCounterHandler = Arc<dyn Fn(&CountersReader, i64, i32) + Send + Sync>;

/// Default client → driver keepalive period.
pub const DEFAULT_KEEPALIVE_INTERVAL_NS: u64 = 500_000_000;

/// Default hard deadline for any single request, and for observing driver
/// liveness, in milliseconds.
pub const DEFAULT_DRIVER_TIMEOUT_MS: u64 = 10_000;

/// Default maximum tolerated gap between conductor service ticks.
pub const DEFAULT_INTER_SERVICE_TIMEOUT_NS: u64 = 10_000_000_000;

/// Default throttle for the service-tick gate and await backoff.
pub const DEFAULT_IDLE_SLEEP_NS: u64 = 16_000_000;

/// Well-known driver directory when none is configured.
pub fn default_driver_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        PathBuf::from("/dev/shm/courser")
    } else {
        std::env::temp_dir().join("courser")
    }
}

/// Client configuration. Build with the `with_*` setters, read with the
/// field-named getters.
#[derive(Clone)]
pub struct Context {
    dir: PathBuf,
    keepalive_interval_ns: u64,
    driver_timeout_ms: u64,
    inter_service_timeout_ns: u64,
    idle_sleep_ns: u64,
    epoch_clock: Arc<dyn EpochClock>,
    nano_clock: Arc<dyn NanoClock>,
    error_handler: ErrorHandler,
    available_image_handler: AvailableImageHandler,
    unavailable_image_handler: UnavailableImageHandler,
    available_counter_handler: Option<AvailableCounterHandler>,
    unavailable_counter_handler: Option<UnavailableCounterHandler>,
    log_buffers_factory: Arc<dyn LogBuffersFactory>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            dir: default_driver_dir(),
            keepalive_interval_ns: DEFAULT_KEEPALIVE_INTERVAL_NS,
            driver_timeout_ms: DEFAULT_DRIVER_TIMEOUT_MS,
            inter_service_timeout_ns: DEFAULT_INTER_SERVICE_TIMEOUT_NS,
            idle_sleep_ns: DEFAULT_IDLE_SLEEP_NS,
            epoch_clock: Arc::new(SystemEpochClock),
            nano_clock: Arc::new(SystemNanoClock),
            error_handler: Arc::new(|err| tracing::error!(error = %err, "client error")),
            available_image_handler: Arc::new(|image| {
                tracing::debug!(
                    correlation_id = image.correlation_id(),
                    source = image.source_identity(),
                    "image available"
                )
            }),
            unavailable_image_handler: Arc::new(|image| {
                tracing::debug!(correlation_id = image.correlation_id(), "image unavailable")
            }),
            available_counter_handler: None,
            unavailable_counter_handler: None,
            log_buffers_factory: Arc::new(MappedLogBuffersFactory),
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check interval and directory sanity before connecting.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.keepalive_interval_ns == 0 {
            return Err(ClientError::InvalidArgument(
                "keepalive_interval_ns must be > 0".into(),
            ));
        }
        if self.driver_timeout_ms == 0 {
            return Err(ClientError::InvalidArgument(
                "driver_timeout_ms must be > 0".into(),
            ));
        }
        if self.inter_service_timeout_ns == 0 {
            return Err(ClientError::InvalidArgument(
                "inter_service_timeout_ns must be > 0".into(),
            ));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(ClientError::InvalidArgument("driver dir is empty".into()));
        }
        Ok(())
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_keepalive_interval_ns(mut self, nanos: u64) -> Self {
        self.keepalive_interval_ns = nanos;
        self
    }

    pub fn with_driver_timeout_ms(mut self, millis: u64) -> Self {
        self.driver_timeout_ms = millis;
        self
    }

    pub fn with_inter_service_timeout_ns(mut self, nanos: u64) -> Self {
        self.inter_service_timeout_ns = nanos;
        self
    }

    pub fn with_idle_sleep_ns(mut self, nanos: u64) -> Self {
        self.idle_sleep_ns = nanos;
        self
    }

    pub fn with_epoch_clock(mut self, clock: Arc<dyn EpochClock>) -> Self {
        self.epoch_clock = clock;
        self
    }

    pub fn with_nano_clock(mut self, clock: Arc<dyn NanoClock>) -> Self {
        self.nano_clock = clock;
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn with_available_image_handler(mut self, handler: AvailableImageHandler) -> Self {
        self.available_image_handler = handler;
        self
    }

    pub fn with_unavailable_image_handler(mut self, handler: UnavailableImageHandler) -> Self {
        self.unavailable_image_handler = handler;
        self
    }

    pub fn with_available_counter_handler(mut self, handler: AvailableCounterHandler) -> Self {
        self.available_counter_handler = Some(handler);
        self
    }

    pub fn with_unavailable_counter_handler(mut self, handler: UnavailableCounterHandler) -> Self {
        self.unavailable_counter_handler = Some(handler);
        self
    }

    pub fn with_log_buffers_factory(mut self, factory: Arc<dyn LogBuffersFactory>) -> Self {
        self.log_buffers_factory = factory;
        self
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the control file inside the driver directory.
    pub fn control_file_path(&self) -> PathBuf {
        self.dir.join(CONTROL_FILE_NAME)
    }

    #[inline]
    pub fn keepalive_interval_ns(&self) -> u64 {
        self.keepalive_interval_ns
    }

    #[inline]
    pub fn driver_timeout_ms(&self) -> u64 {
        self.driver_timeout_ms
    }

    #[inline]
    pub fn inter_service_timeout_ns(&self) -> u64 {
        self.inter_service_timeout_ns
    }

    #[inline]
    pub fn idle_sleep_ns(&self) -> u64 {
        self.idle_sleep_ns
    }

    #[inline]
    pub fn epoch_clock(&self) -> &Arc<dyn EpochClock> {
        &self.epoch_clock
    }

    #[inline]
    pub fn nano_clock(&self) -> &Arc<dyn NanoClock> {
        &self.nano_clock
    }

    #[inline]
    pub fn error_handler(&self) -> &ErrorHandler {
        &self.error_handler
    }

    #[inline]
    pub fn available_image_handler(&self) -> &AvailableImageHandler {
        &self.available_image_handler
    }

    #[inline]
    pub fn unavailable_image_handler(&self) -> &UnavailableImageHandler {
        &self.unavailable_image_handler
    }

    #[inline]
    pub fn available_counter_handler(&self) -> Option<&AvailableCounterHandler> {
        self.available_counter_handler.as_ref()
    }

    #[inline]
    pub fn unavailable_counter_handler(&self) -> Option<&UnavailableCounterHandler> {
        self.unavailable_counter_handler.as_ref()
    }

    #[inline]
    pub fn log_buffers_factory(&self) -> &Arc<dyn LogBuffersFactory> {
        &self.log_buffers_factory
    }
}
