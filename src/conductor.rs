//! The client conductor: the single coordination point between application
//! threads and the media driver.
//!
//! All client ↔ driver interaction serializes through one lock. API calls
//! hold the lock for their full duration, including the response await; the
//! agent tick (`do_work`) takes the lock non-blockingly and yields when an
//! API call is in flight. The awaiting caller drains driver events for all
//! correlation ids while it waits, so interleaved events (an image for
//! another subscription, say) are applied during the wait.
//!
//! The conductor also owns the reference-counted lifecycle of the mapped log
//! buffers shared by publications, subscriptions and images, and enforces
//! liveness with two independent timeouts: the inter-service gap and the
//! driver keepalive.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::agent::Agent;
use crate::buffers::{LogBuffers, LogBuffersFactory};
use crate::clock::{EpochClock, NanoClock};
use crate::command::{MAX_KEY_LENGTH, MAX_LABEL_LENGTH};
use crate::context::{
    AvailableCounterHandler, AvailableImageHandler, Context, ErrorHandler,
    UnavailableCounterHandler, UnavailableImageHandler,
};
use crate::control::ControlFile;
use crate::counter::Counter;
use crate::counters::CountersReader;
use crate::error::{ClientError, DriverErrorCode, Result};
use crate::event::{DriverEventsAdapter, DriverListener};
use crate::proxy::DriverProxy;
use crate::publication::{ExclusivePublication, Publication};
use crate::subscription::{Image, Subscription};

/// Sentinel for background service ticks that are not awaiting a response.
pub const NO_CORRELATION_ID: i64 = -1;

/// Grace interval between a log buffer's refcount reaching zero and its
/// reclamation, letting in-flight readers drain.
pub const RESOURCE_LINGER_NS: u64 = 3_000_000_000;

/// How often the linger list is swept.
pub const RESOURCE_CHECK_INTERVAL_NS: u64 = 500_000_000;

/// Maximum driver events dispatched per service tick.
pub const EVENT_FRAGMENT_LIMIT: usize = 16;

/// A resource registered with the conductor.
pub enum ClientResource {
    Publication(Arc<Publication>),
    ExclusivePublication(Arc<ExclusivePublication>),
    Subscription(Arc<Subscription>),
    Counter(Arc<Counter>),
}

/// Registry and listener state, guarded by the conductor lock.
struct Core {
    weak_self: Weak<ClientConductor>,
    resources: HashMap<i64, ClientResource>,
    log_buffers_by_id: HashMap<i64, Arc<LogBuffers>>,
    lingering: Vec<Arc<LogBuffers>>,
    /// Channel of the add-publication call currently awaiting its response.
    /// Valid because the conductor lock is held across the whole await.
    stashed_channel: Option<String>,
    /// Registration failure latched by an error event during an await.
    driver_error: Option<ClientError>,
    counters_reader: Arc<CountersReader>,

    nano_clock: Arc<dyn NanoClock>,
    epoch_clock: Arc<dyn EpochClock>,
    error_handler: ErrorHandler,
    available_image_handler: AvailableImageHandler,
    unavailable_image_handler: UnavailableImageHandler,
    available_counter_handler: Option<AvailableCounterHandler>,
    unavailable_counter_handler: Option<UnavailableCounterHandler>,
    log_buffers_factory: Arc<dyn LogBuffersFactory>,

    keepalive_interval_ns: u64,
    driver_timeout_ms: u64,
    driver_timeout_ns: u64,
    inter_service_timeout_ns: u64,
    idle_sleep_ns: u64,

    closed: bool,
    time_of_last_service_ns: u64,
    time_of_last_keepalive_ns: u64,
    time_of_last_resources_check_ns: u64,
}

struct Inner {
    proxy: DriverProxy,
    adapter: DriverEventsAdapter,
    core: Core,
}

/// The client conductor. See the module docs for the threading model.
pub struct ClientConductor {
    inner: Mutex<Inner>,
}

impl ClientConductor {
    pub fn new(ctx: &Context, control: Arc<ControlFile>) -> Arc<Self> {
        let proxy = DriverProxy::new(control.clone());
        let adapter = DriverEventsAdapter::new(control.clone());
        let counters_reader = Arc::new(CountersReader::new(control));
        let now = ctx.nano_clock().nanos();

        Arc::new_cyclic(|weak_self| Self {
            inner: Mutex::new(Inner {
                proxy,
                adapter,
                core: Core {
                    weak_self: weak_self.clone(),
                    resources: HashMap::new(),
                    log_buffers_by_id: HashMap::new(),
                    lingering: Vec::new(),
                    stashed_channel: None,
                    driver_error: None,
                    counters_reader,
                    nano_clock: ctx.nano_clock().clone(),
                    epoch_clock: ctx.epoch_clock().clone(),
                    error_handler: ctx.error_handler().clone(),
                    available_image_handler: ctx.available_image_handler().clone(),
                    unavailable_image_handler: ctx.unavailable_image_handler().clone(),
                    available_counter_handler: ctx.available_counter_handler().cloned(),
                    unavailable_counter_handler: ctx.unavailable_counter_handler().cloned(),
                    log_buffers_factory: ctx.log_buffers_factory().clone(),
                    keepalive_interval_ns: ctx.keepalive_interval_ns(),
                    driver_timeout_ms: ctx.driver_timeout_ms(),
                    driver_timeout_ns: ctx.driver_timeout_ms().saturating_mul(1_000_000),
                    inter_service_timeout_ns: ctx.inter_service_timeout_ns(),
                    idle_sleep_ns: ctx.idle_sleep_ns(),
                    closed: false,
                    time_of_last_service_ns: now,
                    time_of_last_keepalive_ns: now,
                    time_of_last_resources_check_ns: now,
                },
            }),
        })
    }

    /// Unique identity of this client with the driver.
    pub fn client_id(&self) -> i64 {
        self.inner.lock().proxy.client_id()
    }

    /// Reader over the driver's counter values.
    pub fn counters_reader(&self) -> Arc<CountersReader> {
        self.inner.lock().core.counters_reader.clone()
    }

    /// One agent tick. Yields (returns 0) when an API call holds the lock.
    /// Returns `Err(Closed)` once closed, signaling agent termination.
    pub fn do_work(&self) -> Result<usize> {
        let Some(mut inner) = self.inner.try_lock() else {
            return Ok(0);
        };
        if inner.core.closed {
            return Err(ClientError::Closed);
        }
        inner.service(NO_CORRELATION_ID)
    }

    /// Orderly close: force-close every registered resource, tell the driver
    /// once, and reclaim all lingering log buffers. Idempotent.
    pub fn close(&self) {
        self.inner.lock().close_now();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().core.closed
    }

    // ── client API ────────────────────────────────────────────────────────────

    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Arc<Publication>> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;

        let correlation_id = inner.proxy.add_publication(channel, stream_id)?;
        inner.core.stashed_channel = Some(channel.to_string());
        self.await_response(&mut inner, correlation_id)?;

        match inner.core.resources.get(&correlation_id) {
            Some(ClientResource::Publication(publication)) => Ok(publication.clone()),
            _ => Err(ClientError::ProtocolViolation(format!(
                "no publication registered for correlation id {correlation_id} after acknowledgement"
            ))),
        }
    }

    pub fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: i32,
    ) -> Result<Arc<ExclusivePublication>> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;

        let correlation_id = inner.proxy.add_exclusive_publication(channel, stream_id)?;
        inner.core.stashed_channel = Some(channel.to_string());
        self.await_response(&mut inner, correlation_id)?;

        match inner.core.resources.get(&correlation_id) {
            Some(ClientResource::ExclusivePublication(publication)) => Ok(publication.clone()),
            _ => Err(ClientError::ProtocolViolation(format!(
                "no exclusive publication registered for correlation id {correlation_id} after acknowledgement"
            ))),
        }
    }

    /// Add a subscription using the context's default image handlers.
    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<Arc<Subscription>> {
        let (available, unavailable) = {
            let inner = self.inner.lock();
            (
                inner.core.available_image_handler.clone(),
                inner.core.unavailable_image_handler.clone(),
            )
        };
        self.add_subscription_with_handlers(channel, stream_id, available, unavailable)
    }

    /// Add a subscription with per-subscription image handlers.
    ///
    /// The subscription is registered before the driver acknowledges. On a
    /// driver timeout the pre-inserted entry stays in the registry and is
    /// reclaimed by `close`; the caller got an error instead of a handle, so
    /// no user release can reach it.
    pub fn add_subscription_with_handlers(
        &self,
        channel: &str,
        stream_id: i32,
        on_available_image: AvailableImageHandler,
        on_unavailable_image: UnavailableImageHandler,
    ) -> Result<Arc<Subscription>> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;

        let correlation_id = inner.proxy.add_subscription(channel, stream_id)?;
        let subscription = Arc::new(Subscription::new(
            inner.core.weak_self.clone(),
            channel.to_string(),
            stream_id,
            correlation_id,
            on_available_image,
            on_unavailable_image,
        ));
        inner
            .core
            .resources
            .insert(correlation_id, ClientResource::Subscription(subscription.clone()));

        self.await_response(&mut inner, correlation_id)?;
        Ok(subscription)
    }

    pub fn add_counter(&self, type_id: i32, key: &[u8], label: &str) -> Result<Arc<Counter>> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;

        if key.len() > MAX_KEY_LENGTH {
            return Err(ClientError::InvalidArgument(format!(
                "counter key length {} exceeds {MAX_KEY_LENGTH}",
                key.len()
            )));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(ClientError::InvalidArgument(format!(
                "counter label length {} exceeds {MAX_LABEL_LENGTH}",
                label.len()
            )));
        }

        let correlation_id = inner.proxy.add_counter(type_id, key, label)?;
        self.await_response(&mut inner, correlation_id)?;

        match inner.core.resources.get(&correlation_id) {
            Some(ClientResource::Counter(counter)) => Ok(counter.clone()),
            _ => Err(ClientError::ProtocolViolation(format!(
                "no counter registered for correlation id {correlation_id} after acknowledgement"
            ))),
        }
    }

    /// Add a counter with an empty key.
    pub fn add_counter_with_label(&self, type_id: i32, label: &str) -> Result<Arc<Counter>> {
        self.add_counter(type_id, &[], label)
    }

    pub fn add_destination(&self, registration_id: i64, endpoint: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        let correlation_id = inner.proxy.add_destination(registration_id, endpoint)?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn remove_destination(&self, registration_id: i64, endpoint: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        let correlation_id = inner.proxy.remove_destination(registration_id, endpoint)?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn add_rcv_destination(&self, registration_id: i64, endpoint: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        let correlation_id = inner.proxy.add_rcv_destination(registration_id, endpoint)?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn remove_rcv_destination(&self, registration_id: i64, endpoint: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        let correlation_id = inner.proxy.remove_rcv_destination(registration_id, endpoint)?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn release_publication(&self, publication: &Arc<Publication>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        if publication.set_closed() {
            return Ok(());
        }

        inner.core.resources.remove(&publication.registration_id());
        inner.core.release_log_buffers(
            publication.log_buffers(),
            publication.original_registration_id(),
        );
        let correlation_id = inner.proxy.remove_publication(publication.registration_id())?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn release_exclusive_publication(
        &self,
        publication: &Arc<ExclusivePublication>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        if publication.set_closed() {
            return Ok(());
        }

        inner.core.resources.remove(&publication.registration_id());
        inner.core.release_log_buffers(
            publication.log_buffers(),
            publication.original_registration_id(),
        );
        let correlation_id = inner.proxy.remove_publication(publication.registration_id())?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn release_subscription(&self, subscription: &Arc<Subscription>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        if subscription.set_closed() {
            return Ok(());
        }

        inner.core.resources.remove(&subscription.registration_id());
        for image in subscription.take_images() {
            image.mark_closed();
            inner.core.invoke_image_handler(
                subscription.unavailable_image_handler(),
                &image,
                "unavailable image",
            );
            inner
                .core
                .release_log_buffers(image.log_buffers(), image.correlation_id());
        }
        let correlation_id = inner.proxy.remove_subscription(subscription.registration_id())?;
        self.await_response(&mut inner, correlation_id)
    }

    pub fn release_counter(&self, counter: &Arc<Counter>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.core.ensure_open()?;
        if counter.set_closed() {
            return Ok(());
        }

        inner.core.resources.remove(&counter.registration_id());
        let correlation_id = inner.proxy.remove_counter(counter.registration_id())?;
        self.await_response(&mut inner, correlation_id)
    }

    // ── diagnostics ───────────────────────────────────────────────────────────

    /// Number of registered resources.
    pub fn resource_count(&self) -> usize {
        self.inner.lock().core.resources.len()
    }

    /// Whether a registration id is present in the registry.
    pub fn has_resource(&self, registration_id: i64) -> bool {
        self.inner.lock().core.resources.contains_key(&registration_id)
    }

    /// Number of mapped log buffers with a nonzero refcount.
    pub fn log_buffers_count(&self) -> usize {
        self.inner.lock().core.log_buffers_by_id.len()
    }

    /// Refcount of the log buffers registered under `registration_id`.
    pub fn log_buffers_refcount(&self, registration_id: i64) -> Option<i64> {
        self.inner
            .lock()
            .core
            .log_buffers_by_id
            .get(&registration_id)
            .map(|buffers| buffers.refcount())
    }

    /// Number of log buffers awaiting reclamation.
    pub fn lingering_count(&self) -> usize {
        self.inner.lock().core.lingering.len()
    }

    // ── await protocol ────────────────────────────────────────────────────────

    /// Wait for the driver to acknowledge `correlation_id`, servicing the
    /// conductor between idle sleeps. The lock is held for the whole wait,
    /// which is what keeps the stashed channel valid and correlation ids
    /// un-interleaved.
    fn await_response(&self, inner: &mut Inner, correlation_id: i64) -> Result<()> {
        inner.core.driver_error = None;
        let deadline = inner.core.nano_clock.nanos() + inner.core.driver_timeout_ns;
        let idle = crate::idle::IdleStrategy::Sleep(inner.core.idle_sleep_ns);

        loop {
            idle.idle();

            if let Err(e) = inner.service(correlation_id) {
                inner.core.stashed_channel = None;
                return Err(e);
            }

            if inner.adapter.last_received_correlation_id() == correlation_id {
                inner.core.stashed_channel = None;
                if let Some(error) = inner.core.driver_error.take() {
                    return Err(error);
                }
                return Ok(());
            }

            if inner.core.nano_clock.nanos() > deadline {
                inner.core.stashed_channel = None;
                return Err(ClientError::DriverTimeout(format!(
                    "no response from driver within {} ms for correlation id {correlation_id}",
                    inner.core.driver_timeout_ms
                )));
            }
        }
    }
}

impl Inner {
    /// One service pass: timeout checks, then one bounded poll of the driver
    /// events adapter. Failures go to the error handler; an awaiting API call
    /// sees them re-thrown, a background tick swallows all but fatal ones.
    fn service(&mut self, correlation_id: i64) -> Result<usize> {
        let result = match self.check_timeouts() {
            Ok(timeout_work) => {
                let Inner { adapter, core, .. } = self;
                Ok(timeout_work + adapter.receive(core, EVENT_FRAGMENT_LIMIT))
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(work) => Ok(work),
            Err(error) => {
                (self.core.error_handler)(&error);
                if correlation_id != NO_CORRELATION_ID || error.is_fatal() {
                    Err(error)
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn check_timeouts(&mut self) -> Result<usize> {
        let now = self.core.nano_clock.nanos();

        // Throttle clock reads and timeout work under tight agent loops.
        if now.saturating_sub(self.core.time_of_last_service_ns) <= self.core.idle_sleep_ns {
            return Ok(0);
        }

        let mut work = 0;

        if now - self.core.time_of_last_service_ns > self.core.inter_service_timeout_ns {
            let gap = now - self.core.time_of_last_service_ns;
            let lingering_before = self.core.lingering.len();
            self.core.force_close_resources();
            if self.core.lingering.len() > lingering_before {
                // Let readers of the newly freed logs notice before unmap.
                std::thread::sleep(Duration::from_millis(1));
            }
            self.close_now();
            return Err(ClientError::ConductorServiceTimeout(format!(
                "service interval {gap} ns exceeded {} ns",
                self.core.inter_service_timeout_ns
            )));
        }

        if now - self.core.time_of_last_keepalive_ns > self.core.keepalive_interval_ns {
            let epoch_now_ms = self.core.epoch_clock.millis();
            let last_driver_ms = self.proxy.time_of_last_driver_keepalive_ms();
            if epoch_now_ms > last_driver_ms + self.core.driver_timeout_ms as i64 {
                self.close_now();
                return Err(ClientError::DriverTimeout(format!(
                    "driver inactive: last keepalive {} ms ago exceeds timeout {} ms",
                    epoch_now_ms - last_driver_ms,
                    self.core.driver_timeout_ms
                )));
            }
            self.proxy.send_client_keepalive()?;
            self.core.time_of_last_keepalive_ns = now;
            work += 1;
        }

        if now - self.core.time_of_last_resources_check_ns > RESOURCE_CHECK_INTERVAL_NS {
            work += self.core.sweep_lingering(now);
            self.core.time_of_last_resources_check_ns = now;
        }

        self.core.time_of_last_service_ns = now;
        Ok(work)
    }

    /// Orderly close. Idempotent: the closed flag makes the second call a
    /// no-op.
    fn close_now(&mut self) {
        if self.core.closed {
            return;
        }
        self.core.closed = true;

        let lingering_before = self.core.lingering.len();
        self.core.force_close_resources();

        if let Err(error) = self.proxy.client_close() {
            tracing::warn!(error = %error, "failed to send client close");
        }

        if self.core.lingering.len() > lingering_before {
            // Let readers of the newly freed logs notice before unmap.
            std::thread::sleep(Duration::from_millis(1));
        }

        // Reclaim every lingering mapping regardless of its timestamp.
        self.core.lingering.clear();
        tracing::debug!("client conductor closed");
    }
}

impl Core {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }

    /// Look up or map the log buffers for `registration_id`, incrementing the
    /// refcount before returning so every sharer holds its own count.
    fn log_buffers(&mut self, registration_id: i64, log_file: &str) -> Result<Arc<LogBuffers>> {
        if let Some(buffers) = self.log_buffers_by_id.get(&registration_id) {
            buffers.incr_ref();
            return Ok(buffers.clone());
        }

        let buffers = self.log_buffers_factory.map_log_file(log_file)?;
        buffers.incr_ref();
        self.log_buffers_by_id.insert(registration_id, buffers.clone());
        Ok(buffers)
    }

    /// Drop one reference. At zero the entry leaves the registry and lingers
    /// with the current timestamp; the sweep reclaims it after
    /// [`RESOURCE_LINGER_NS`].
    fn release_log_buffers(&mut self, buffers: &Arc<LogBuffers>, registration_id: i64) {
        if buffers.decr_ref() == 0 {
            buffers.set_time_of_last_state_change_ns(self.nano_clock.nanos());
            if let Some(buffers) = self.log_buffers_by_id.remove(&registration_id) {
                self.lingering.push(buffers);
            }
        }
    }

    /// Reverse walk with swap-removal keeps reclamation O(1) per entry; the
    /// order of lingering entries is not observable.
    fn sweep_lingering(&mut self, now: u64) -> usize {
        let mut reclaimed = 0;
        let mut i = self.lingering.len();
        while i > 0 {
            i -= 1;
            let age = now.saturating_sub(self.lingering[i].time_of_last_state_change_ns());
            if age > RESOURCE_LINGER_NS {
                self.lingering.swap_remove(i);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Mark every registered resource closed at the handle layer and drop the
    /// log-buffer references. No driver commands are issued: this runs on
    /// fatal timeouts and inside close, where the driver is gone or about to
    /// be told once.
    fn force_close_resources(&mut self) {
        let resources: Vec<ClientResource> = self.resources.drain().map(|(_, r)| r).collect();
        for resource in resources {
            match resource {
                ClientResource::Publication(publication) => {
                    publication.set_closed();
                    self.release_log_buffers(
                        publication.log_buffers(),
                        publication.original_registration_id(),
                    );
                }
                ClientResource::ExclusivePublication(publication) => {
                    publication.set_closed();
                    self.release_log_buffers(
                        publication.log_buffers(),
                        publication.original_registration_id(),
                    );
                }
                ClientResource::Subscription(subscription) => {
                    subscription.set_closed();
                    for image in subscription.take_images() {
                        image.mark_closed();
                        self.release_log_buffers(image.log_buffers(), image.correlation_id());
                    }
                }
                ClientResource::Counter(counter) => {
                    counter.set_closed();
                }
            }
        }
    }

    fn invoke_image_handler(
        &self,
        handler: &AvailableImageHandler,
        image: &Image,
        what: &str,
    ) {
        if catch_unwind(AssertUnwindSafe(|| handler(image))).is_err() {
            (self.error_handler)(&ClientError::Unexpected(format!("{what} handler panicked")));
        }
    }
}

impl DriverListener for Core {
    fn on_error(&mut self, correlation_id: i64, code: DriverErrorCode, message: &str) {
        tracing::debug!(correlation_id, %code, message, "driver rejected command");
        self.driver_error = Some(ClientError::Registration {
            code,
            message: message.to_string(),
        });
    }

    fn on_channel_endpoint_error(&mut self, status_indicator_id: i32, message: &str) {
        for resource in self.resources.values() {
            let is_match = match resource {
                ClientResource::Publication(p) => p.channel_status_id() == status_indicator_id,
                ClientResource::ExclusivePublication(p) => {
                    p.channel_status_id() == status_indicator_id
                }
                ClientResource::Subscription(s) => s.channel_status_id() == status_indicator_id,
                ClientResource::Counter(_) => false,
            };
            if is_match {
                (self.error_handler)(&ClientError::ChannelEndpoint {
                    status_indicator_id,
                    message: message.to_string(),
                });
            }
        }
    }

    fn on_operation_success(&mut self, _correlation_id: i64) {}

    fn on_new_publication(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    ) {
        let channel = self.stashed_channel.take().unwrap_or_default();
        let buffers = match self.log_buffers(registration_id, log_file) {
            Ok(buffers) => buffers,
            Err(error) => {
                self.driver_error = Some(error);
                return;
            }
        };
        let publication = Arc::new(Publication::new(
            self.weak_self.clone(),
            channel,
            stream_id,
            session_id,
            registration_id,
            correlation_id,
            publication_limit_id,
            channel_status_id,
            buffers,
        ));
        self.resources
            .insert(correlation_id, ClientResource::Publication(publication));
    }

    fn on_new_exclusive_publication(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    ) {
        let channel = self.stashed_channel.take().unwrap_or_default();
        let buffers = match self.log_buffers(registration_id, log_file) {
            Ok(buffers) => buffers,
            Err(error) => {
                self.driver_error = Some(error);
                return;
            }
        };
        let publication = Arc::new(ExclusivePublication::new(
            self.weak_self.clone(),
            channel,
            stream_id,
            session_id,
            registration_id,
            correlation_id,
            publication_limit_id,
            channel_status_id,
            buffers,
        ));
        self.resources.insert(
            correlation_id,
            ClientResource::ExclusivePublication(publication),
        );
    }

    fn on_new_subscription(&mut self, correlation_id: i64, channel_status_id: i32) {
        if let Some(ClientResource::Subscription(subscription)) =
            self.resources.get(&correlation_id)
        {
            subscription.set_channel_status_id(channel_status_id);
        }
    }

    fn on_available_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        session_id: i32,
        _stream_id: i32,
        subscriber_position_id: i32,
        log_file: &str,
        source_identity: &str,
    ) {
        let Some(ClientResource::Subscription(subscription)) =
            self.resources.get(&subscription_registration_id)
        else {
            return;
        };
        let subscription = subscription.clone();
        if subscription.has_image(correlation_id) {
            return;
        }

        let buffers = match self.log_buffers(correlation_id, log_file) {
            Ok(buffers) => buffers,
            Err(error) => {
                (self.error_handler)(&error);
                return;
            }
        };
        let image = Arc::new(Image::new(
            correlation_id,
            session_id,
            subscription_registration_id,
            subscriber_position_id,
            source_identity.to_string(),
            buffers,
        ));

        // Callback before the list insert, so the application observes the
        // image before a poll can race on it.
        self.invoke_image_handler(
            subscription.available_image_handler(),
            &image,
            "available image",
        );
        subscription.add_image(image);
    }

    fn on_unavailable_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        _stream_id: i32,
    ) {
        let Some(ClientResource::Subscription(subscription)) =
            self.resources.get(&subscription_registration_id)
        else {
            return;
        };
        let subscription = subscription.clone();

        if let Some(image) = subscription.remove_image(correlation_id) {
            image.mark_closed();
            self.invoke_image_handler(
                subscription.unavailable_image_handler(),
                &image,
                "unavailable image",
            );
            self.release_log_buffers(image.log_buffers(), image.correlation_id());
        }
    }

    fn on_new_counter(&mut self, correlation_id: i64, counter_id: i32) {
        let counter = Arc::new(Counter::new(
            self.weak_self.clone(),
            correlation_id,
            counter_id,
            self.counters_reader.clone(),
        ));
        self.resources
            .insert(correlation_id, ClientResource::Counter(counter));
        self.on_available_counter(correlation_id, counter_id);
    }

    fn on_available_counter(&mut self, registration_id: i64, counter_id: i32) {
        if let Some(handler) = &self.available_counter_handler {
            let reader = &self.counters_reader;
            if catch_unwind(AssertUnwindSafe(|| handler(reader, registration_id, counter_id)))
                .is_err()
            {
                (self.error_handler)(&ClientError::Unexpected(
                    "available counter handler panicked".into(),
                ));
            }
        }
    }

    fn on_unavailable_counter(&mut self, registration_id: i64, counter_id: i32) {
        if let Some(handler) = &self.unavailable_counter_handler {
            let reader = &self.counters_reader;
            if catch_unwind(AssertUnwindSafe(|| handler(reader, registration_id, counter_id)))
                .is_err()
            {
                (self.error_handler)(&ClientError::Unexpected(
                    "unavailable counter handler panicked".into(),
                ));
            }
        }
    }
}

/// Adapts the conductor to the [`Agent`] contract for an agent runner.
pub struct ConductorAgent {
    conductor: Arc<ClientConductor>,
}

impl ConductorAgent {
    pub fn new(conductor: Arc<ClientConductor>) -> Self {
        Self { conductor }
    }
}

impl Agent for ConductorAgent {
    fn role_name(&self) -> &str {
        "client-conductor"
    }

    fn do_work(&mut self) -> Result<usize> {
        self.conductor.do_work()
    }
}
