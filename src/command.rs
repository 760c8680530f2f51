//! Outbound command messages (client → driver).
//!
//! Commands are laid out as a correlated header followed by command-specific
//! fields, all native-endian. Variable-length fields carry an explicit length
//! prefix. Decoders validate that the message meets the fixed minimum length
//! and that every declared length fits within the message; failure is a
//! malformed-command error on the receiving side.

use std::fmt;

/// Maximum counter key length in bytes.
pub const MAX_KEY_LENGTH: usize = 112;

/// Maximum counter label length in bytes.
pub const MAX_LABEL_LENGTH: usize = 380;

/// Command type constants carried in the ring record header.
pub mod command_type {
    pub const ADD_PUBLICATION: i32 = 0x01;
    pub const REMOVE_PUBLICATION: i32 = 0x02;
    pub const ADD_EXCLUSIVE_PUBLICATION: i32 = 0x03;
    pub const ADD_SUBSCRIPTION: i32 = 0x04;
    pub const REMOVE_SUBSCRIPTION: i32 = 0x05;
    pub const ADD_DESTINATION: i32 = 0x06;
    pub const REMOVE_DESTINATION: i32 = 0x07;
    pub const ADD_RCV_DESTINATION: i32 = 0x08;
    pub const REMOVE_RCV_DESTINATION: i32 = 0x09;
    pub const ADD_COUNTER: i32 = 0x0A;
    pub const REMOVE_COUNTER: i32 = 0x0B;
    pub const CLIENT_KEEPALIVE: i32 = 0x0C;
    pub const CLIENT_CLOSE: i32 = 0x0D;

    /// Command type name for debugging.
    pub const fn name(command_type: i32) -> &'static str {
        match command_type {
            ADD_PUBLICATION => "AddPublication",
            REMOVE_PUBLICATION => "RemovePublication",
            ADD_EXCLUSIVE_PUBLICATION => "AddExclusivePublication",
            ADD_SUBSCRIPTION => "AddSubscription",
            REMOVE_SUBSCRIPTION => "RemoveSubscription",
            ADD_DESTINATION => "AddDestination",
            REMOVE_DESTINATION => "RemoveDestination",
            ADD_RCV_DESTINATION => "AddRcvDestination",
            REMOVE_RCV_DESTINATION => "RemoveRcvDestination",
            ADD_COUNTER => "AddCounter",
            REMOVE_COUNTER => "RemoveCounter",
            CLIENT_KEEPALIVE => "ClientKeepalive",
            CLIENT_CLOSE => "ClientClose",
            _ => "Unknown",
        }
    }
}

/// Error decoding a command message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDecodeError {
    /// Message shorter than the fixed minimum for its type
    TooShort,
    /// A declared field length does not fit within the message
    LengthOutOfBounds,
    /// A string field is not valid UTF-8
    BadString,
}

impl fmt::Display for CommandDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandDecodeError::TooShort => write!(f, "command message too short"),
            CommandDecodeError::LengthOutOfBounds => {
                write!(f, "declared length exceeds command message")
            }
            CommandDecodeError::BadString => write!(f, "command string is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CommandDecodeError {}

// ── fixed headers ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy)]
struct PublicationHeader {
    correlation_id: i64,
    stream_id: i32,
    channel_length: i32,
}

const PUBLICATION_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<PublicationHeader>() == PUBLICATION_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct RemoveHeader {
    correlation_id: i64,
    registration_id: i64,
}

const REMOVE_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<RemoveHeader>() == REMOVE_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct DestinationHeader {
    correlation_id: i64,
    registration_id: i64,
    endpoint_length: i32,
    _reserved: i32,
}

const DESTINATION_HEADER_SIZE: usize = 24;
const _: () = assert!(size_of::<DestinationHeader>() == DESTINATION_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct CounterHeader {
    correlation_id: i64,
    type_id: i32,
    key_length: i32,
}

const COUNTER_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<CounterHeader>() == COUNTER_HEADER_SIZE);

#[repr(C)]
#[derive(Clone, Copy)]
struct ClientHeader {
    client_id: i64,
}

const CLIENT_HEADER_SIZE: usize = 8;
const _: () = assert!(size_of::<ClientHeader>() == CLIENT_HEADER_SIZE);

fn read_header<T: Copy>(buf: &[u8]) -> Result<T, CommandDecodeError> {
    if buf.len() < size_of::<T>() {
        return Err(CommandDecodeError::TooShort);
    }
    // Ring payloads are 8-aligned, but decoders also accept plain byte
    // buffers, so read unaligned.
    Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) })
}

fn tail_str(
    buf: &[u8],
    offset: usize,
    declared_len: i32,
) -> Result<&str, CommandDecodeError> {
    let len = usize::try_from(declared_len).map_err(|_| CommandDecodeError::LengthOutOfBounds)?;
    let end = offset
        .checked_add(len)
        .ok_or(CommandDecodeError::LengthOutOfBounds)?;
    if end > buf.len() {
        return Err(CommandDecodeError::LengthOutOfBounds);
    }
    std::str::from_utf8(&buf[offset..end]).map_err(|_| CommandDecodeError::BadString)
}

// ── publication / subscription ────────────────────────────────────────────────

/// Add-publication, add-exclusive-publication, and add-subscription commands
/// all carry the same fields.
#[derive(Debug, PartialEq, Eq)]
pub struct PublicationCommand<'a> {
    pub correlation_id: i64,
    pub stream_id: i32,
    pub channel: &'a str,
}

pub fn encode_publication(correlation_id: i64, stream_id: i32, channel: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PUBLICATION_HEADER_SIZE + channel.len());
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&stream_id.to_ne_bytes());
    buf.extend_from_slice(&(channel.len() as i32).to_ne_bytes());
    buf.extend_from_slice(channel.as_bytes());
    buf
}

pub fn decode_publication(buf: &[u8]) -> Result<PublicationCommand<'_>, CommandDecodeError> {
    let header: PublicationHeader = read_header(buf)?;
    let channel = tail_str(buf, PUBLICATION_HEADER_SIZE, header.channel_length)?;
    Ok(PublicationCommand {
        correlation_id: header.correlation_id,
        stream_id: header.stream_id,
        channel,
    })
}

// ── remove ────────────────────────────────────────────────────────────────────

/// Remove-publication, remove-subscription, and remove-counter commands.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoveCommand {
    pub correlation_id: i64,
    pub registration_id: i64,
}

pub fn encode_remove(correlation_id: i64, registration_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REMOVE_HEADER_SIZE);
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&registration_id.to_ne_bytes());
    buf
}

pub fn decode_remove(buf: &[u8]) -> Result<RemoveCommand, CommandDecodeError> {
    let header: RemoveHeader = read_header(buf)?;
    Ok(RemoveCommand {
        correlation_id: header.correlation_id,
        registration_id: header.registration_id,
    })
}

// ── destination ───────────────────────────────────────────────────────────────

/// Add/remove destination commands for publications and subscriptions.
#[derive(Debug, PartialEq, Eq)]
pub struct DestinationCommand<'a> {
    pub correlation_id: i64,
    pub registration_id: i64,
    pub endpoint: &'a str,
}

pub fn encode_destination(correlation_id: i64, registration_id: i64, endpoint: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DESTINATION_HEADER_SIZE + endpoint.len());
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&registration_id.to_ne_bytes());
    buf.extend_from_slice(&(endpoint.len() as i32).to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf.extend_from_slice(endpoint.as_bytes());
    buf
}

pub fn decode_destination(buf: &[u8]) -> Result<DestinationCommand<'_>, CommandDecodeError> {
    let header: DestinationHeader = read_header(buf)?;
    let endpoint = tail_str(buf, DESTINATION_HEADER_SIZE, header.endpoint_length)?;
    Ok(DestinationCommand {
        correlation_id: header.correlation_id,
        registration_id: header.registration_id,
        endpoint,
    })
}

// ── counter ───────────────────────────────────────────────────────────────────

/// Add-counter command: typed key bytes plus a human-readable label.
#[derive(Debug, PartialEq, Eq)]
pub struct CounterCommand<'a> {
    pub correlation_id: i64,
    pub type_id: i32,
    pub key: &'a [u8],
    pub label: &'a str,
}

pub fn encode_counter(correlation_id: i64, type_id: i32, key: &[u8], label: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(COUNTER_HEADER_SIZE + key.len() + 4 + label.len());
    buf.extend_from_slice(&correlation_id.to_ne_bytes());
    buf.extend_from_slice(&type_id.to_ne_bytes());
    buf.extend_from_slice(&(key.len() as i32).to_ne_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(label.len() as i32).to_ne_bytes());
    buf.extend_from_slice(label.as_bytes());
    buf
}

pub fn decode_counter(buf: &[u8]) -> Result<CounterCommand<'_>, CommandDecodeError> {
    let header: CounterHeader = read_header(buf)?;

    let key_len =
        usize::try_from(header.key_length).map_err(|_| CommandDecodeError::LengthOutOfBounds)?;
    if key_len > MAX_KEY_LENGTH {
        return Err(CommandDecodeError::LengthOutOfBounds);
    }
    let key_end = COUNTER_HEADER_SIZE + key_len;
    if key_end + 4 > buf.len() {
        return Err(CommandDecodeError::LengthOutOfBounds);
    }
    let key = &buf[COUNTER_HEADER_SIZE..key_end];

    let label_len = i32::from_ne_bytes(
        buf[key_end..key_end + 4]
            .try_into()
            .expect("slice length checked"),
    );
    if label_len as usize > MAX_LABEL_LENGTH {
        return Err(CommandDecodeError::LengthOutOfBounds);
    }
    let label = tail_str(buf, key_end + 4, label_len)?;

    Ok(CounterCommand {
        correlation_id: header.correlation_id,
        type_id: header.type_id,
        key,
        label,
    })
}

// ── client keepalive / close ──────────────────────────────────────────────────

/// Client-keepalive and client-close commands.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientCommand {
    pub client_id: i64,
}

pub fn encode_client(client_id: i64) -> Vec<u8> {
    client_id.to_ne_bytes().to_vec()
}

pub fn decode_client(buf: &[u8]) -> Result<ClientCommand, CommandDecodeError> {
    let header: ClientHeader = read_header(buf)?;
    Ok(ClientCommand {
        client_id: header.client_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publication_roundtrip() {
        let buf = encode_publication(7, 10, "courser:udp?endpoint=localhost:40123");
        let decoded = decode_publication(&buf).unwrap();

        assert_eq!(decoded.correlation_id, 7);
        assert_eq!(decoded.stream_id, 10);
        assert_eq!(decoded.channel, "courser:udp?endpoint=localhost:40123");
    }

    #[test]
    fn publication_too_short() {
        let buf = encode_publication(7, 10, "courser:ipc");
        assert_eq!(
            decode_publication(&buf[..12]),
            Err(CommandDecodeError::TooShort)
        );
    }

    #[test]
    fn publication_channel_length_beyond_message() {
        let mut buf = encode_publication(7, 10, "courser:ipc");
        // Declare a channel longer than the message actually carries.
        buf[12..16].copy_from_slice(&100i32.to_ne_bytes());
        assert_eq!(
            decode_publication(&buf),
            Err(CommandDecodeError::LengthOutOfBounds)
        );
    }

    #[test]
    fn publication_negative_channel_length() {
        let mut buf = encode_publication(7, 10, "courser:ipc");
        buf[12..16].copy_from_slice(&(-1i32).to_ne_bytes());
        assert_eq!(
            decode_publication(&buf),
            Err(CommandDecodeError::LengthOutOfBounds)
        );
    }

    #[test]
    fn publication_non_utf8_channel() {
        let mut buf = encode_publication(7, 10, "abcd");
        buf[16] = 0xFF;
        buf[17] = 0xFE;
        assert_eq!(decode_publication(&buf), Err(CommandDecodeError::BadString));
    }

    #[test]
    fn remove_roundtrip() {
        let buf = encode_remove(8, 7);
        assert_eq!(
            decode_remove(&buf).unwrap(),
            RemoveCommand {
                correlation_id: 8,
                registration_id: 7,
            }
        );
    }

    #[test]
    fn destination_roundtrip() {
        let buf = encode_destination(15, 7, "localhost:40456");
        let decoded = decode_destination(&buf).unwrap();

        assert_eq!(decoded.correlation_id, 15);
        assert_eq!(decoded.registration_id, 7);
        assert_eq!(decoded.endpoint, "localhost:40456");
    }

    #[test]
    fn counter_roundtrip() {
        let key = [1u8, 2, 3, 4];
        let buf = encode_counter(21, 1001, &key, "requests handled");
        let decoded = decode_counter(&buf).unwrap();

        assert_eq!(decoded.correlation_id, 21);
        assert_eq!(decoded.type_id, 1001);
        assert_eq!(decoded.key, &key);
        assert_eq!(decoded.label, "requests handled");
    }

    #[test]
    fn counter_empty_key_roundtrip() {
        let buf = encode_counter(22, 1002, &[], "errors");
        let decoded = decode_counter(&buf).unwrap();
        assert!(decoded.key.is_empty());
        assert_eq!(decoded.label, "errors");
    }

    #[test]
    fn counter_key_length_beyond_message() {
        let mut buf = encode_counter(22, 1002, &[9u8; 8], "errors");
        buf[12..16].copy_from_slice(&64i32.to_ne_bytes());
        assert_eq!(
            decode_counter(&buf),
            Err(CommandDecodeError::LengthOutOfBounds)
        );
    }

    #[test]
    fn client_roundtrip() {
        let buf = encode_client(99);
        assert_eq!(decode_client(&buf).unwrap(), ClientCommand { client_id: 99 });
    }

    #[test]
    fn command_type_names() {
        assert_eq!(command_type::name(command_type::ADD_PUBLICATION), "AddPublication");
        assert_eq!(command_type::name(command_type::CLIENT_CLOSE), "ClientClose");
        assert_eq!(command_type::name(0x7F), "Unknown");
    }
}
