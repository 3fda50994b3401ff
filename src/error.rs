//! Error types
//!
//! A single crate-wide [`Error`] with a protocol-specific sub-error for the
//! MQTT command client.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket, pipe or process I/O failure
    Io(io::Error),
    /// MQTT protocol or broker failure
    Mqtt(MqttError),
    /// The camera byte stream ended
    SourceEnded,
    /// The frame buffer was closed (shutdown)
    BufferClosed,
    /// An operation did not complete in time
    Timeout(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Mqtt(e) => write!(f, "MQTT error: {}", e),
            Error::SourceEnded => write!(f, "Frame source ended"),
            Error::BufferClosed => write!(f, "Frame buffer closed"),
            Error::Timeout(what) => write!(f, "Timed out: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Mqtt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        Error::Mqtt(e)
    }
}

/// MQTT client errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    /// Packet could not be decoded
    MalformedPacket(&'static str),
    /// Remaining length field longer than four bytes or over the limit
    InvalidRemainingLength,
    /// Packet type not valid in the current state
    UnexpectedPacket(u8),
    /// Broker refused the connection (CONNACK return code)
    ConnectionRefused(u8),
    /// Broker rejected a subscription
    SubscriptionRejected(u16),
    /// Broker closed the connection
    ConnectionClosed,
    /// No PINGRESP before the keepalive deadline
    KeepAliveTimeout,
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttError::MalformedPacket(reason) => write!(f, "Malformed packet: {}", reason),
            MqttError::InvalidRemainingLength => write!(f, "Invalid remaining length"),
            MqttError::UnexpectedPacket(kind) => write!(f, "Unexpected packet type: {}", kind),
            MqttError::ConnectionRefused(code) => {
                write!(f, "Connection refused: {} ({})", connack_reason(*code), code)
            }
            MqttError::SubscriptionRejected(id) => {
                write!(f, "Subscription rejected (packet id {})", id)
            }
            MqttError::ConnectionClosed => write!(f, "Connection closed by broker"),
            MqttError::KeepAliveTimeout => write!(f, "Keepalive timeout"),
        }
    }
}

impl std::error::Error for MqttError {}

fn connack_reason(code: u8) -> &'static str {
    match code {
        1 => "unacceptable protocol version",
        2 => "identifier rejected",
        3 => "server unavailable",
        4 => "bad user name or password",
        5 => "not authorized",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_connack_display() {
        let err = Error::from(MqttError::ConnectionRefused(5));
        assert_eq!(
            err.to_string(),
            "MQTT error: Connection refused: not authorized (5)"
        );
    }
}
