//! Inbound driver events: codec, listener surface, and the events adapter.
//!
//! The driver broadcasts events on the event ring. [`DriverEventsAdapter`]
//! polls that ring, decodes each record, and dispatches it to a
//! [`DriverListener`] (the conductor). The adapter records the correlation id
//! of the last *command acknowledgement* it observed — image and counter
//! availability events carry their own ids drawn from the same driver-wide
//! counter and may interleave ahead of an outstanding acknowledgement, so
//! they are dispatched but never recorded.

use std::fmt;
use std::sync::Arc;

use crate::control::ControlFile;
use crate::error::DriverErrorCode;
use crate::ring::RingConsumer;

/// Event type constants carried in the ring record header.
pub mod event_type {
    pub const ON_ERROR: i32 = 0x10;
    pub const ON_OPERATION_SUCCESS: i32 = 0x11;
    pub const ON_NEW_PUBLICATION: i32 = 0x12;
    pub const ON_NEW_EXCLUSIVE_PUBLICATION: i32 = 0x13;
    pub const ON_NEW_SUBSCRIPTION: i32 = 0x14;
    pub const ON_AVAILABLE_IMAGE: i32 = 0x15;
    pub const ON_UNAVAILABLE_IMAGE: i32 = 0x16;
    pub const ON_NEW_COUNTER: i32 = 0x17;
    pub const ON_AVAILABLE_COUNTER: i32 = 0x18;
    pub const ON_UNAVAILABLE_COUNTER: i32 = 0x19;
    pub const ON_CHANNEL_ENDPOINT_ERROR: i32 = 0x1A;

    /// Event type name for debugging.
    pub const fn name(event_type: i32) -> &'static str {
        match event_type {
            ON_ERROR => "OnError",
            ON_OPERATION_SUCCESS => "OnOperationSuccess",
            ON_NEW_PUBLICATION => "OnNewPublication",
            ON_NEW_EXCLUSIVE_PUBLICATION => "OnNewExclusivePublication",
            ON_NEW_SUBSCRIPTION => "OnNewSubscription",
            ON_AVAILABLE_IMAGE => "OnAvailableImage",
            ON_UNAVAILABLE_IMAGE => "OnUnavailableImage",
            ON_NEW_COUNTER => "OnNewCounter",
            ON_AVAILABLE_COUNTER => "OnAvailableCounter",
            ON_UNAVAILABLE_COUNTER => "OnUnavailableCounter",
            ON_CHANNEL_ENDPOINT_ERROR => "OnChannelEndpointError",
            _ => "Unknown",
        }
    }
}

/// Listener surface the conductor implements; one method per driver event.
pub trait DriverListener {
    fn on_error(&mut self, correlation_id: i64, code: DriverErrorCode, message: &str);

    fn on_channel_endpoint_error(&mut self, status_indicator_id: i32, message: &str);

    fn on_operation_success(&mut self, correlation_id: i64);

    #[allow(clippy::too_many_arguments)]
    fn on_new_publication(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    );

    #[allow(clippy::too_many_arguments)]
    fn on_new_exclusive_publication(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    );

    fn on_new_subscription(&mut self, correlation_id: i64, channel_status_id: i32);

    #[allow(clippy::too_many_arguments)]
    fn on_available_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        session_id: i32,
        stream_id: i32,
        subscriber_position_id: i32,
        log_file: &str,
        source_identity: &str,
    );

    fn on_unavailable_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        stream_id: i32,
    );

    fn on_new_counter(&mut self, correlation_id: i64, counter_id: i32);

    fn on_available_counter(&mut self, registration_id: i64, counter_id: i32);

    fn on_unavailable_counter(&mut self, registration_id: i64, counter_id: i32);
}

/// Error decoding an event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDecodeError {
    /// Message shorter than the fixed minimum for its type
    TooShort,
    /// A declared field length does not fit within the message
    LengthOutOfBounds,
    /// A string field is not valid UTF-8
    BadString,
    /// Unknown event type
    UnknownType(i32),
}

impl fmt::Display for EventDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventDecodeError::TooShort => write!(f, "event message too short"),
            EventDecodeError::LengthOutOfBounds => {
                write!(f, "declared length exceeds event message")
            }
            EventDecodeError::BadString => write!(f, "event string is not valid UTF-8"),
            EventDecodeError::UnknownType(t) => write!(f, "unknown event type {t}"),
        }
    }
}

impl std::error::Error for EventDecodeError {}

// ── fixed headers ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy)]
struct ErrorEventHeader {
    offending_correlation_id: i64,
    error_code: u32,
    message_length: i32,
}

const ERROR_EVENT_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<ErrorEventHeader>() == ERROR_EVENT_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct EndpointErrorHeader {
    status_indicator_id: i32,
    message_length: i32,
}

const ENDPOINT_ERROR_HEADER_SIZE: usize = 8;
const _: () = assert!(size_of::<EndpointErrorHeader>() == ENDPOINT_ERROR_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct OperationSuccessHeader {
    correlation_id: i64,
}

const OPERATION_SUCCESS_HEADER_SIZE: usize = 8;
const _: () = assert!(size_of::<OperationSuccessHeader>() == OPERATION_SUCCESS_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct NewPublicationHeader {
    correlation_id: i64,
    registration_id: i64,
    session_id: i32,
    stream_id: i32,
    publication_limit_id: i32,
    channel_status_id: i32,
    log_file_length: i32,
    _reserved: i32,
}

const NEW_PUBLICATION_HEADER_SIZE: usize = 40;
const _: () = assert!(size_of::<NewPublicationHeader>() == NEW_PUBLICATION_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct NewSubscriptionHeader {
    correlation_id: i64,
    channel_status_id: i32,
    _reserved: i32,
}

const NEW_SUBSCRIPTION_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<NewSubscriptionHeader>() == NEW_SUBSCRIPTION_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct AvailableImageHeader {
    correlation_id: i64,
    subscription_registration_id: i64,
    session_id: i32,
    stream_id: i32,
    subscriber_position_id: i32,
    log_file_length: i32,
}

const AVAILABLE_IMAGE_HEADER_SIZE: usize = 32;
const _: () = assert!(size_of::<AvailableImageHeader>() == AVAILABLE_IMAGE_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct UnavailableImageHeader {
    correlation_id: i64,
    subscription_registration_id: i64,
    stream_id: i32,
    _reserved: i32,
}

const UNAVAILABLE_IMAGE_HEADER_SIZE: usize = 24;
const _: () = assert!(size_of::<UnavailableImageHeader>() == UNAVAILABLE_IMAGE_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct CounterUpdateHeader {
    correlation_id: i64,
    counter_id: i32,
    _reserved: i32,
}

const COUNTER_UPDATE_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<CounterUpdateHeader>() == COUNTER_UPDATE_HEADER_SIZE);

fn read_header<T: Copy>(buf: &[u8]) -> Result<T, EventDecodeError> {
    if buf.len() < size_of::<T>() {
        return Err(EventDecodeError::TooShort);
    }
    Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) })
}

fn tail_str(buf: &[u8], offset: usize, declared_len: i32) -> Result<&str, EventDecodeError> {
    let len = usize::try_from(declared_len).map_err(|_| EventDecodeError::LengthOutOfBounds)?;
    let end = offset
        .checked_add(len)
        .ok_or(EventDecodeError::LengthOutOfBounds)?;
    if end > buf.len() {
        return Err(EventDecodeError::LengthOutOfBounds);
    }
    std::str::from_utf8(&buf[offset..end]).map_err(|_| EventDecodeError::BadString)
}

// ── encoders (driver side) ────────────────────────────────────────────────────

pub fn encode_error(offending_correlation_id: i64, code: DriverErrorCode, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ERROR_EVENT_HEADER_SIZE + message.len());
    buf.extend_from_slice(&offending_correlation_id.to_ne_bytes());
    buf.extend_from_slice(&code.as_u32().to_ne_bytes());
    buf.extend_from_slice(&(message.len() as i32).to_ne_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf
}

pub fn encode_channel_endpoint_error(status_indicator_id: i32, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENDPOINT_ERROR_HEADER_SIZE + message.len());
    buf.extend_from_slice(&status_indicator_id.to_ne_bytes());
    buf.extend_from_slice(&(message.len() as i32).to_ne_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf
}

pub fn encode_operation_success(correlation_id: i64) -> Vec<u8> {
    correlation_id.to_ne_bytes().to_vec()
}

#[allow(clippy::too_many_arguments)]
pub fn encode_new_publication(
    correlation_id: i64,
    registration_id: i64,
    session_id: i32,
    stream_id: i32,
    publication_limit_id: i32,
    channel_status_id: i32,
    log_file: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NEW_PUBLICATION_HEADER_SIZE + log_file.len());
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&registration_id.to_ne_bytes());
    buf.extend_from_slice(&session_id.to_ne_bytes());
    buf.extend_from_slice(&stream_id.to_ne_bytes());
    buf.extend_from_slice(&publication_limit_id.to_ne_bytes());
    buf.extend_from_slice(&channel_status_id.to_ne_bytes());
    buf.extend_from_slice(&(log_file.len() as i32).to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf.extend_from_slice(log_file.as_bytes());
    buf
}

pub fn encode_new_subscription(correlation_id: i64, channel_status_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NEW_SUBSCRIPTION_HEADER_SIZE);
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&channel_status_id.to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf
}

#[allow(clippy::too_many_arguments)]
pub fn encode_available_image(
    correlation_id: i64,
    subscription_registration_id: i64,
    session_id: i32,
    stream_id: i32,
    subscriber_position_id: i32,
    log_file: &str,
    source_identity: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        AVAILABLE_IMAGE_HEADER_SIZE + log_file.len() + 4 + source_identity.len(),
    );
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&subscription_registration_id.to_ne_bytes());
    buf.extend_from_slice(&session_id.to_ne_bytes());
    buf.extend_from_slice(&stream_id.to_ne_bytes());
    buf.extend_from_slice(&subscriber_position_id.to_ne_bytes());
    buf.extend_from_slice(&(log_file.len() as i32).to_ne_bytes());
    buf.extend_from_slice(log_file.as_bytes());
    buf.extend_from_slice(&(source_identity.len() as i32).to_ne_bytes());
    buf.extend_from_slice(source_identity.as_bytes());
    buf
}

pub fn encode_unavailable_image(
    correlation_id: i64,
    subscription_registration_id: i64,
    stream_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(UNAVAILABLE_IMAGE_HEADER_SIZE);
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&subscription_registration_id.to_ne_bytes());
    buf.extend_from_slice(&stream_id.to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf
}

pub fn encode_counter_update(correlation_id: i64, counter_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(COUNTER_UPDATE_HEADER_SIZE);
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&counter_id.to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf
}

// ── dispatch ──────────────────────────────────────────────────────────────────

/// Decode one event record and invoke the matching listener method.
///
/// Returns `Some(correlation_id)` when the event acknowledges a command.
fn dispatch_event(
    record_type: i32,
    buf: &[u8],
    listener: &mut dyn DriverListener,
) -> Result<Option<i64>, EventDecodeError> {
    match record_type {
        event_type::ON_ERROR => {
            let header: ErrorEventHeader = read_header(buf)?;
            let message = tail_str(buf, ERROR_EVENT_HEADER_SIZE, header.message_length)?;
            let code = DriverErrorCode::from_u32(header.error_code)
                .unwrap_or(DriverErrorCode::GenericError);
            listener.on_error(header.offending_correlation_id, code, message);
            Ok(Some(header.offending_correlation_id))
        }
        event_type::ON_CHANNEL_ENDPOINT_ERROR => {
            let header: EndpointErrorHeader = read_header(buf)?;
            let message = tail_str(buf, ENDPOINT_ERROR_HEADER_SIZE, header.message_length)?;
            listener.on_channel_endpoint_error(header.status_indicator_id, message);
            Ok(None)
        }
        event_type::ON_OPERATION_SUCCESS => {
            let header: OperationSuccessHeader = read_header(buf)?;
            listener.on_operation_success(header.correlation_id);
            Ok(Some(header.correlation_id))
        }
        event_type::ON_NEW_PUBLICATION | event_type::ON_NEW_EXCLUSIVE_PUBLICATION => {
            let header: NewPublicationHeader = read_header(buf)?;
            let log_file = tail_str(buf, NEW_PUBLICATION_HEADER_SIZE, header.log_file_length)?;
            if record_type == event_type::ON_NEW_PUBLICATION {
                listener.on_new_publication(
                    header.correlation_id,
                    header.registration_id,
                    header.session_id,
                    header.stream_id,
                    header.publication_limit_id,
                    header.channel_status_id,
                    log_file,
                );
            } else {
                listener.on_new_exclusive_publication(
                    header.correlation_id,
                    header.registration_id,
                    header.session_id,
                    header.stream_id,
                    header.publication_limit_id,
                    header.channel_status_id,
                    log_file,
                );
            }
            Ok(Some(header.correlation_id))
        }
        event_type::ON_NEW_SUBSCRIPTION => {
            let header: NewSubscriptionHeader = read_header(buf)?;
            listener.on_new_subscription(header.correlation_id, header.channel_status_id);
            Ok(Some(header.correlation_id))
        }
        event_type::ON_AVAILABLE_IMAGE => {
            let header: AvailableImageHeader = read_header(buf)?;
            let log_file = tail_str(buf, AVAILABLE_IMAGE_HEADER_SIZE, header.log_file_length)?;
            let identity_offset = AVAILABLE_IMAGE_HEADER_SIZE + log_file.len() + 4;
            if identity_offset > buf.len() {
                return Err(EventDecodeError::LengthOutOfBounds);
            }
            let identity_len = i32::from_ne_bytes(
                buf[identity_offset - 4..identity_offset]
                    .try_into()
                    .expect("slice length checked"),
            );
            let source_identity = tail_str(buf, identity_offset, identity_len)?;
            listener.on_available_image(
                header.correlation_id,
                header.subscription_registration_id,
                header.session_id,
                header.stream_id,
                header.subscriber_position_id,
                log_file,
                source_identity,
            );
            Ok(None)
        }
        event_type::ON_UNAVAILABLE_IMAGE => {
            let header: UnavailableImageHeader = read_header(buf)?;
            listener.on_unavailable_image(
                header.correlation_id,
                header.subscription_registration_id,
                header.stream_id,
            );
            Ok(None)
        }
        event_type::ON_NEW_COUNTER => {
            let header: CounterUpdateHeader = read_header(buf)?;
            listener.on_new_counter(header.correlation_id, header.counter_id);
            Ok(Some(header.correlation_id))
        }
        event_type::ON_AVAILABLE_COUNTER => {
            let header: CounterUpdateHeader = read_header(buf)?;
            listener.on_available_counter(header.correlation_id, header.counter_id);
            Ok(None)
        }
        event_type::ON_UNAVAILABLE_COUNTER => {
            let header: CounterUpdateHeader = read_header(buf)?;
            listener.on_unavailable_counter(header.correlation_id, header.counter_id);
            Ok(None)
        }
        other => Err(EventDecodeError::UnknownType(other)),
    }
}

/// Polls the event ring and routes each event to the listener.
pub struct DriverEventsAdapter {
    consumer: RingConsumer,
    last_received_correlation_id: i64,
    /// Keeps the mapping alive for the consumer's region views
    _control: Arc<ControlFile>,
}

impl DriverEventsAdapter {
    /// The adapter is the sole consumer of the control file's event ring;
    /// create at most one per client.
    pub fn new(control: Arc<ControlFile>) -> Self {
        let consumer = unsafe { RingConsumer::from_region(control.event_ring_region()) };
        Self {
            consumer,
            last_received_correlation_id: crate::conductor::NO_CORRELATION_ID,
            _control: control,
        }
    }

    /// One non-blocking poll, bounded by `limit` events. Returns the number
    /// of events dispatched. Malformed events are logged and skipped.
    pub fn receive(&mut self, listener: &mut dyn DriverListener, limit: usize) -> usize {
        let Self {
            consumer,
            last_received_correlation_id,
            ..
        } = self;

        consumer.read(limit, |record_type, payload| {
            match dispatch_event(record_type, payload, listener) {
                Ok(Some(ack_id)) => *last_received_correlation_id = ack_id,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        event = event_type::name(record_type),
                        error = %e,
                        "dropping malformed driver event"
                    );
                }
            }
        })
    }

    /// Correlation id of the last command acknowledgement observed.
    #[inline]
    pub fn last_received_correlation_id(&self) -> i64 {
        self.last_received_correlation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlConfig, ControlFile};
    use crate::ring::RingProducer;

    #[derive(Default)]
    struct RecordingListener {
        events: Vec<String>,
    }

    impl DriverListener for RecordingListener {
        fn on_error(&mut self, correlation_id: i64, code: DriverErrorCode, message: &str) {
            self.events
                .push(format!("error:{correlation_id}:{}:{message}", code.as_u32()));
        }

        fn on_channel_endpoint_error(&mut self, status_indicator_id: i32, message: &str) {
            self.events
                .push(format!("endpoint_error:{status_indicator_id}:{message}"));
        }

        fn on_operation_success(&mut self, correlation_id: i64) {
            self.events.push(format!("operation_success:{correlation_id}"));
        }

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
            self.events.push(format!(
                "new_publication:{correlation_id}:{registration_id}:{session_id}:{stream_id}:{publication_limit_id}:{channel_status_id}:{log_file}"
            ));
        }

        fn on_new_exclusive_publication(
            &mut self,
            correlation_id: i64,
            _registration_id: i64,
            _session_id: i32,
            _stream_id: i32,
            _publication_limit_id: i32,
            _channel_status_id: i32,
            _log_file: &str,
        ) {
            self.events
                .push(format!("new_exclusive_publication:{correlation_id}"));
        }

        fn on_new_subscription(&mut self, correlation_id: i64, channel_status_id: i32) {
            self.events
                .push(format!("new_subscription:{correlation_id}:{channel_status_id}"));
        }

        fn on_available_image(
            &mut self,
            correlation_id: i64,
            subscription_registration_id: i64,
            session_id: i32,
            stream_id: i32,
            _subscriber_position_id: i32,
            log_file: &str,
            source_identity: &str,
        ) {
            self.events.push(format!(
                "available_image:{correlation_id}:{subscription_registration_id}:{session_id}:{stream_id}:{log_file}:{source_identity}"
            ));
        }

        fn on_unavailable_image(
            &mut self,
            correlation_id: i64,
            subscription_registration_id: i64,
            stream_id: i32,
        ) {
            self.events.push(format!(
                "unavailable_image:{correlation_id}:{subscription_registration_id}:{stream_id}"
            ));
        }

        fn on_new_counter(&mut self, correlation_id: i64, counter_id: i32) {
            self.events
                .push(format!("new_counter:{correlation_id}:{counter_id}"));
        }

        fn on_available_counter(&mut self, registration_id: i64, counter_id: i32) {
            self.events
                .push(format!("available_counter:{registration_id}:{counter_id}"));
        }

        fn on_unavailable_counter(&mut self, registration_id: i64, counter_id: i32) {
            self.events
                .push(format!("unavailable_counter:{registration_id}:{counter_id}"));
        }
    }

    fn adapter_fixture() -> (Arc<ControlFile>, RingProducer, DriverEventsAdapter) {
        let control = Arc::new(ControlFile::create_heap(ControlConfig::default()));
        let producer = unsafe { RingProducer::from_region(control.event_ring_region()) };
        let adapter = DriverEventsAdapter::new(control.clone());
        (control, producer, adapter)
    }

    #[test]
    fn dispatches_in_event_order() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        producer
            .write(
                event_type::ON_NEW_PUBLICATION,
                &encode_new_publication(7, 7, 0x1111_1111, 10, 3, 5, "/tmp/pub-7.log"),
            )
            .unwrap();
        producer
            .write(
                event_type::ON_AVAILABLE_IMAGE,
                &encode_available_image(30, 20, 1, 10, 4, "/tmp/log-A", "127.0.0.1:4000"),
            )
            .unwrap();

        let count = adapter.receive(&mut listener, 16);
        assert_eq!(count, 2);
        assert_eq!(
            listener.events,
            vec![
                "new_publication:7:7:286331153:10:3:5:/tmp/pub-7.log".to_string(),
                "available_image:30:20:1:10:/tmp/log-A:127.0.0.1:4000".to_string(),
            ]
        );
    }

    #[test]
    fn only_acknowledgements_update_last_received() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        assert_eq!(
            adapter.last_received_correlation_id(),
            crate::conductor::NO_CORRELATION_ID
        );

        producer
            .write(event_type::ON_OPERATION_SUCCESS, &encode_operation_success(8))
            .unwrap();
        adapter.receive(&mut listener, 16);
        assert_eq!(adapter.last_received_correlation_id(), 8);

        // An image event carries a later id but must not move the ack cursor.
        producer
            .write(
                event_type::ON_AVAILABLE_IMAGE,
                &encode_available_image(30, 20, 1, 10, 4, "/tmp/log-A", "src"),
            )
            .unwrap();
        producer
            .write(
                event_type::ON_UNAVAILABLE_IMAGE,
                &encode_unavailable_image(30, 20, 10),
            )
            .unwrap();
        adapter.receive(&mut listener, 16);
        assert_eq!(adapter.last_received_correlation_id(), 8);
    }

    #[test]
    fn error_event_acknowledges_offending_id() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        producer
            .write(
                event_type::ON_ERROR,
                &encode_error(11, DriverErrorCode::InvalidChannel, "bad uri"),
            )
            .unwrap();
        adapter.receive(&mut listener, 16);

        assert_eq!(adapter.last_received_correlation_id(), 11);
        assert_eq!(listener.events, vec!["error:11:1:bad uri".to_string()]);
    }

    #[test]
    fn receive_respects_fragment_limit() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        for i in 0..5 {
            producer
                .write(
                    event_type::ON_OPERATION_SUCCESS,
                    &encode_operation_success(i),
                )
                .unwrap();
        }

        assert_eq!(adapter.receive(&mut listener, 3), 3);
        assert_eq!(adapter.last_received_correlation_id(), 2);
        assert_eq!(adapter.receive(&mut listener, 16), 2);
        assert_eq!(adapter.last_received_correlation_id(), 4);
    }

    #[test]
    fn malformed_event_is_skipped() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        // Too short for a new-subscription event.
        producer
            .write(event_type::ON_NEW_SUBSCRIPTION, &[0u8; 4])
            .unwrap();
        producer
            .write(event_type::ON_OPERATION_SUCCESS, &encode_operation_success(5))
            .unwrap();

        adapter.receive(&mut listener, 16);
        assert_eq!(listener.events, vec!["operation_success:5".to_string()]);
        assert_eq!(adapter.last_received_correlation_id(), 5);
    }

    #[test]
    fn endpoint_error_routes_without_acknowledging() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        producer
            .write(
                event_type::ON_CHANNEL_ENDPOINT_ERROR,
                &encode_channel_endpoint_error(5, "bind failed"),
            )
            .unwrap();
        adapter.receive(&mut listener, 16);

        assert_eq!(
            listener.events,
            vec!["endpoint_error:5:bind failed".to_string()]
        );
        assert_eq!(
            adapter.last_received_correlation_id(),
            crate::conductor::NO_CORRELATION_ID
        );
    }

    #[test]
    fn counter_events_roundtrip() {
        let (_control, mut producer, mut adapter) = adapter_fixture();
        let mut listener = RecordingListener::default();

        producer
            .write(event_type::ON_NEW_COUNTER, &encode_counter_update(21, 12))
            .unwrap();
        producer
            .write(
                event_type::ON_UNAVAILABLE_COUNTER,
                &encode_counter_update(21, 12),
            )
            .unwrap();
        adapter.receive(&mut listener, 16);

        assert_eq!(
            listener.events,
            vec![
                "new_counter:21:12".to_string(),
                "unavailable_counter:21:12".to_string(),
            ]
        );
        assert_eq!(adapter.last_received_correlation_id(), 21);
    }
}
