use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::FrameError;
use crate::frame::codec::{encode_frame, FrameConfig};
#[cfg(unix)]
use crate::socket::SocketStream;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes framed payloads to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and write one payload (blocking), then flush.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if self.is_retryable(&err) => continue,
                Err(err) => return Err(self.io_error(err)),
            }
        }

        self.flush()
    }

    pub fn flush(&mut self) -> Result<(), FrameError> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if self.is_retryable(&err) => continue,
                Err(err) => return Err(self.io_error(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    // With a write timeout set, a socket reports expiry as WouldBlock.
    fn is_retryable(&self, err: &std::io::Error) -> bool {
        err.kind() == ErrorKind::WouldBlock && self.config.write_timeout().is_none()
    }

    fn io_error(&self, err: std::io::Error) -> FrameError {
        match (err.kind(), self.config.write_timeout()) {
            (ErrorKind::WouldBlock | ErrorKind::TimedOut, Some(timeout)) => {
                FrameError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("write timed out after {timeout:?}"),
                ))
            }
            _ => FrameError::Io(err),
        }
    }
}

#[cfg(unix)]
impl FrameWriter<SocketStream> {
    /// Writer over a socket with the write timeout from `config` applied.
    pub fn with_config_socket(
        inner: SocketStream,
        config: FrameConfig,
    ) -> crate::error::Result<Self> {
        inner.set_write_timeout(config.write_timeout())?;
        Ok(Self::with_config(inner, config))
    }
}
