//! Error taxonomy for the client.
//!
//! Two layers: [`DriverErrorCode`] is the wire-level code the driver attaches
//! to a rejected command, and [`ClientError`] is everything the client surface
//! can raise, including the fatal timeout classes that tear the conductor
//! down.

use std::fmt;
use std::io;

/// Error codes carried on driver error events (wire values).
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverErrorCode {
    /// Unspecified driver-side failure
    GenericError = 0,
    /// Channel URI could not be parsed or resolved
    InvalidChannel = 1,
    /// Registration id does not name a known subscription
    UnknownSubscription = 2,
    /// Registration id does not name a known publication
    UnknownPublication = 3,
    /// Transport endpoint failed to bind or send
    ChannelEndpointError = 4,
    /// Registration id does not name a known counter
    UnknownCounter = 5,
    /// Command failed wire-format validation
    MalformedCommand = 10,
    /// Command is valid but not supported by this driver
    NotSupported = 11,
    /// Driver ran out of storage for log files
    StorageSpace = 12,
}

impl DriverErrorCode {
    /// Convert from a u32 wire value.
    /// Returns None if the value doesn't match a known error code.
    pub fn from_u32(val: u32) -> Option<Self> {
        Some(match val {
            0 => DriverErrorCode::GenericError,
            1 => DriverErrorCode::InvalidChannel,
            2 => DriverErrorCode::UnknownSubscription,
            3 => DriverErrorCode::UnknownPublication,
            4 => DriverErrorCode::ChannelEndpointError,
            5 => DriverErrorCode::UnknownCounter,
            10 => DriverErrorCode::MalformedCommand,
            11 => DriverErrorCode::NotSupported,
            12 => DriverErrorCode::StorageSpace,
            _ => return None,
        })
    }

    /// Convert to u32 for wire transmission.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Get a human-readable description of this error code.
    pub fn description(self) -> &'static str {
        match self {
            DriverErrorCode::GenericError => "generic error",
            DriverErrorCode::InvalidChannel => "invalid channel",
            DriverErrorCode::UnknownSubscription => "unknown subscription",
            DriverErrorCode::UnknownPublication => "unknown publication",
            DriverErrorCode::ChannelEndpointError => "channel endpoint error",
            DriverErrorCode::UnknownCounter => "unknown counter",
            DriverErrorCode::MalformedCommand => "malformed command",
            DriverErrorCode::NotSupported => "not supported",
            DriverErrorCode::StorageSpace => "storage space",
        }
    }
}

impl fmt::Display for DriverErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u32())
    }
}

/// Errors surfaced by the client conductor and its collaborators.
#[derive(Debug)]
pub enum ClientError {
    /// Operation on a closed conductor.
    Closed,
    /// Argument rejected before any command was issued.
    InvalidArgument(String),
    /// The driver rejected a specific correlation id with a code and message.
    Registration {
        code: DriverErrorCode,
        message: String,
    },
    /// No response within the driver timeout, or the driver heartbeat went
    /// stale. The latter is fatal and tears the conductor down.
    DriverTimeout(String),
    /// The gap between service ticks exceeded the inter-service timeout.
    /// Fatal.
    ConductorServiceTimeout(String),
    /// Asynchronous endpoint failure for a specific channel-status indicator.
    /// The owning resource stays registered.
    ChannelEndpoint {
        status_indicator_id: i32,
        message: String,
    },
    /// A user callback panicked. Reported to the error handler, never fatal.
    Unexpected(String),
    /// A peer violated the control protocol (e.g. acknowledged a command
    /// without producing the promised resource).
    ProtocolViolation(String),
    /// The command ring had no space for a command.
    RingFull,
    /// Control-file or log-file I/O failure.
    Io(io::Error),
}

impl ClientError {
    /// Fatal errors close the conductor when raised by the service loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::DriverTimeout(_) | ClientError::ConductorServiceTimeout(_)
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Closed => write!(f, "client conductor is closed"),
            ClientError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ClientError::Registration { code, message } => {
                write!(f, "registration rejected by driver: {code}: {message}")
            }
            ClientError::DriverTimeout(msg) => write!(f, "driver timeout: {msg}"),
            ClientError::ConductorServiceTimeout(msg) => {
                write!(f, "conductor service timeout: {msg}")
            }
            ClientError::ChannelEndpoint {
                status_indicator_id,
                message,
            } => {
                write!(
                    f,
                    "channel endpoint error for status indicator {status_indicator_id}: {message}"
                )
            }
            ClientError::Unexpected(msg) => write!(f, "unexpected error: {msg}"),
            ClientError::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            ClientError::RingFull => write!(f, "command ring is full"),
            ClientError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        let codes = [
            DriverErrorCode::GenericError,
            DriverErrorCode::InvalidChannel,
            DriverErrorCode::UnknownSubscription,
            DriverErrorCode::UnknownPublication,
            DriverErrorCode::ChannelEndpointError,
            DriverErrorCode::UnknownCounter,
            DriverErrorCode::MalformedCommand,
            DriverErrorCode::NotSupported,
            DriverErrorCode::StorageSpace,
        ];

        for &code in &codes {
            let val = code.as_u32();
            assert_eq!(DriverErrorCode::from_u32(val), Some(code));
        }
    }

    #[test]
    fn unknown_error_code_is_none() {
        assert_eq!(DriverErrorCode::from_u32(6), None);
        assert_eq!(DriverErrorCode::from_u32(9999), None);
    }

    #[test]
    fn fatal_classification() {
        assert!(ClientError::DriverTimeout("x".into()).is_fatal());
        assert!(ClientError::ConductorServiceTimeout("x".into()).is_fatal());
        assert!(!ClientError::Closed.is_fatal());
        assert!(!ClientError::RingFull.is_fatal());
        assert!(
            !ClientError::Registration {
                code: DriverErrorCode::InvalidChannel,
                message: "bad uri".into(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn display_carries_driver_code() {
        let err = ClientError::Registration {
            code: DriverErrorCode::InvalidChannel,
            message: "bad uri".into(),
        };
        let text = err.to_string();
        assert!(text.contains("invalid channel"));
        assert!(text.contains("bad uri"));
    }
}
