use std::fmt;
use std::io;

use malstack_encoding::UnknownEncoding;
use malstack_message::ConstructionError;
use malstack_transport::{standard, FrameError, MultipleTransmitError, TransmitError, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DELIVERY_FAILED: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(err) => frame_error(context, err),
        TransportError::UnknownEncoding(err) => encoding_error(err),
        TransportError::Config { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::Inbound(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidMagic => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn encoding_error(err: UnknownEncoding) -> CliError {
    CliError::new(USAGE, err.to_string())
}

pub fn construction_error(context: &str, err: ConstructionError) -> CliError {
    match err {
        ConstructionError::Operation { .. } | ConstructionError::InvalidStage { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

/// Exit code for a failed transmission, by standard error number.
pub fn transmit_code(err: &TransmitError) -> i32 {
    match err.number {
        standard::DELIVERY_TIMEDOUT => TIMEOUT,
        standard::BAD_ENCODING => DATA_INVALID,
        standard::INTERNAL => INTERNAL,
        standard::SHUTDOWN | standard::DESTINATION_UNKNOWN => TRANSPORT_ERROR,
        _ => DELIVERY_FAILED,
    }
}

pub fn multiple_transmit_error(err: &MultipleTransmitError) -> CliError {
    let code = err.errors.first().map(transmit_code).unwrap_or(FAILURE);
    CliError::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = io_error("send", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
        let err = TransmitError::new(standard::DELIVERY_TIMEDOUT, "slow");
        assert_eq!(transmit_code(&err), TIMEOUT);
    }

    #[test]
    fn aggregate_uses_first_failure() {
        let err = MultipleTransmitError {
            errors: vec![
                TransmitError::new(standard::DELIVERY_FAILED, "a"),
                TransmitError::new(standard::INTERNAL, "b"),
            ],
        };
        assert_eq!(multiple_transmit_error(&err).code, DELIVERY_FAILED);
    }

    #[test]
    fn unknown_encoding_is_usage() {
        let err = transport_error(
            "config",
            TransportError::UnknownEncoding(UnknownEncoding("xml".into())),
        );
        assert_eq!(err.code, USAGE);
    }
}
