use std::fmt;
use std::path::PathBuf;

use malstack_encoding::UnknownEncoding;
use malstack_message::{ConstructionError, Message};

/// Errors that can occur setting up or running a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Framing failed on a socket stream.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// An endpoint with this name already exists.
    #[error("endpoint '{0}' already exists")]
    DuplicateEndpoint(String),

    /// The configured encoding is not known.
    #[error(transparent)]
    UnknownEncoding(#[from] UnknownEncoding),

    /// The configuration file could not be read or parsed.
    #[error("invalid transport config {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// An inbound buffer was not a valid message.
    #[error("inbound message rejected: {0}")]
    Inbound(#[from] ConstructionError),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4D4F \"MO\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl From<FrameError> for std::io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => io,
            FrameError::ConnectionClosed => {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, err.to_string())
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// MAL standard error numbers.
pub mod standard {
    pub const DELIVERY_FAILED: u32 = 65536;
    pub const DELIVERY_TIMEDOUT: u32 = 65537;
    pub const DELIVERY_DELAYED: u32 = 65538;
    pub const DESTINATION_UNKNOWN: u32 = 65539;
    pub const DESTINATION_TRANSIENT: u32 = 65540;
    pub const DESTINATION_LOST: u32 = 65541;
    pub const AUTHENTICATION_FAIL: u32 = 65542;
    pub const AUTHORISATION_FAIL: u32 = 65543;
    pub const ENCRYPTION_FAIL: u32 = 65544;
    pub const UNSUPPORTED_AREA: u32 = 65545;
    pub const UNSUPPORTED_AREA_VERSION: u32 = 65546;
    pub const UNSUPPORTED_SERVICE: u32 = 65547;
    pub const UNSUPPORTED_OPERATION: u32 = 65548;
    pub const BAD_ENCODING: u32 = 65549;
    pub const INTERNAL: u32 = 65550;
    pub const UNKNOWN: u32 = 65551;
    pub const INCORRECT_STATE: u32 = 65552;
    pub const TOO_MANY: u32 = 65553;
    pub const SHUTDOWN: u32 = 65554;

    /// Short name for a standard error number.
    pub fn name(number: u32) -> &'static str {
        match number {
            DELIVERY_FAILED => "DELIVERY_FAILED",
            DELIVERY_TIMEDOUT => "DELIVERY_TIMEDOUT",
            DELIVERY_DELAYED => "DELIVERY_DELAYED",
            DESTINATION_UNKNOWN => "DESTINATION_UNKNOWN",
            DESTINATION_TRANSIENT => "DESTINATION_TRANSIENT",
            DESTINATION_LOST => "DESTINATION_LOST",
            AUTHENTICATION_FAIL => "AUTHENTICATION_FAIL",
            AUTHORISATION_FAIL => "AUTHORISATION_FAIL",
            ENCRYPTION_FAIL => "ENCRYPTION_FAIL",
            UNSUPPORTED_AREA => "UNSUPPORTED_AREA",
            UNSUPPORTED_AREA_VERSION => "UNSUPPORTED_AREA_VERSION",
            UNSUPPORTED_SERVICE => "UNSUPPORTED_SERVICE",
            UNSUPPORTED_OPERATION => "UNSUPPORTED_OPERATION",
            BAD_ENCODING => "BAD_ENCODING",
            INTERNAL => "INTERNAL",
            UNKNOWN => "UNKNOWN",
            INCORRECT_STATE => "INCORRECT_STATE",
            TOO_MANY => "TOO_MANY",
            SHUTDOWN => "SHUTDOWN",
            _ => "NON_STANDARD",
        }
    }
}

/// A message could not be transmitted.
///
/// Carries a MAL standard error number, a diagnostic and, when known, the
/// message that failed.
#[derive(Debug, Clone, thiserror::Error)]
pub struct TransmitError {
    pub number: u32,
    pub info: String,
    pub message: Option<Box<Message>>,
}

impl TransmitError {
    pub fn new(number: u32, info: impl Into<String>) -> Self {
        Self {
            number,
            info: info.into(),
            message: None,
        }
    }

    /// Attach the message that failed.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(Box::new(message));
        self
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_deref()
    }
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transmit failed: {} ({}): {}",
            standard::name(self.number),
            self.number,
            self.info
        )
    }
}

/// Every failure from one batch send, in attempt order.
#[derive(Debug, Clone, thiserror::Error)]
pub struct MultipleTransmitError {
    pub errors: Vec<TransmitError>,
}

impl fmt::Display for MultipleTransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} message(s) failed to transmit", self.errors.len())?;
        for err in &self.errors {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_error_names_standard_number() {
        let err = TransmitError::new(standard::DESTINATION_UNKNOWN, "no route");
        assert_eq!(
            err.to_string(),
            "transmit failed: DESTINATION_UNKNOWN (65539): no route"
        );
        assert!(err.message().is_none());
    }

    #[test]
    fn multiple_error_lists_every_cause() {
        let err = MultipleTransmitError {
            errors: vec![
                TransmitError::new(standard::DELIVERY_FAILED, "a"),
                TransmitError::new(standard::INTERNAL, "b"),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 message(s)"));
        assert!(text.contains("DELIVERY_FAILED"));
        assert!(text.contains("INTERNAL"));
    }

    #[test]
    fn frame_error_maps_to_io_kind() {
        let io: std::io::Error = FrameError::ConnectionClosed.into();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
        let io: std::io::Error = FrameError::InvalidMagic.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidData);
    }
}
