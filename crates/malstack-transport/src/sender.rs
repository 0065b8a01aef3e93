//! Sender bindings: the physical side of the send pipeline.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tracing::debug;

use crate::frame::{FrameConfig, FrameWriter};
use crate::holder::OutgoingMessageHolder;

/// Capability to put encoded messages on a link.
///
/// `send_encoded_message` blocks until the payload is written; it does not
/// post the holder's result, the caller does. `close` must be idempotent and
/// safe on an instance that never connected.
pub trait MessageSender: Send {
    fn send_encoded_message(&mut self, holder: &OutgoingMessageHolder) -> io::Result<()>;

    fn close(&mut self);

    /// Handle that can abort a blocked write from another thread.
    ///
    /// Taken once, when the binding is registered. Bindings whose writes
    /// always return promptly can keep the default.
    fn interrupt_handle(&self) -> Option<Arc<dyn Interrupt>> {
        None
    }
}

impl<S: MessageSender + ?Sized> MessageSender for Box<S> {
    fn send_encoded_message(&mut self, holder: &OutgoingMessageHolder) -> io::Result<()> {
        (**self).send_encoded_message(holder)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn interrupt_handle(&self) -> Option<Arc<dyn Interrupt>> {
        (**self).interrupt_handle()
    }
}

/// Unblocks a sender stuck in a write. The interrupted write must fail.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

#[cfg(unix)]
impl Interrupt for crate::socket::SocketStream {
    fn interrupt(&self) {
        if let Err(err) = self.shutdown() {
            debug!(error = %err, "socket shutdown during interrupt failed");
        }
    }
}

/// Writes every payload as one frame on a byte stream.
pub struct StreamSender<W: Write> {
    writer: Option<FrameWriter<W>>,
    interrupt: Option<Arc<dyn Interrupt>>,
}

impl<W: Write> StreamSender<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            writer: Some(FrameWriter::with_config(inner, config)),
            interrupt: None,
        }
    }

    /// Attach a handle that aborts writes on `inner` from another thread.
    pub fn with_interrupt(mut self, interrupt: Arc<dyn Interrupt>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl<W: Write + Send> MessageSender for StreamSender<W> {
    fn send_encoded_message(&mut self, holder: &OutgoingMessageHolder) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sender is closed"))?;
        writer.send(holder.payload()).map_err(Into::into)
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
            debug!("stream sender closed");
        }
    }

    fn interrupt_handle(&self) -> Option<Arc<dyn Interrupt>> {
        self.interrupt.clone()
    }
}

/// Stream sender over a connected Unix-domain socket.
#[cfg(unix)]
pub type UdsSender = StreamSender<crate::socket::SocketStream>;

#[cfg(unix)]
impl StreamSender<crate::socket::SocketStream> {
    /// Connect to the socket at `path`, applying the write timeout from `config`.
    pub fn connect(
        path: impl AsRef<std::path::Path>,
        config: FrameConfig,
    ) -> crate::error::Result<Self> {
        let stream = crate::uds::connect(path)?;
        let interrupt: Arc<dyn Interrupt> = Arc::new(stream.try_clone()?);
        Ok(Self {
            writer: Some(FrameWriter::with_config_socket(stream, config)?),
            interrupt: Some(interrupt),
        })
    }
}

/// Shared in-memory destination for [`MemorySender`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    payloads: Arc<Mutex<Vec<Bytes>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything delivered so far.
    pub fn drain(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.payloads.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, payload: Bytes) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
    }
}

/// Delivers payloads into a [`MemorySink`].
#[derive(Debug)]
pub struct MemorySender {
    sink: MemorySink,
    closed: bool,
}

impl MemorySender {
    pub fn new(sink: MemorySink) -> Self {
        Self {
            sink,
            closed: false,
        }
    }
}

impl MessageSender for MemorySender {
    fn send_encoded_message(&mut self, holder: &OutgoingMessageHolder) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sender is closed"));
        }
        self.sink.push(holder.payload().clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::frame::{decode_frame, DEFAULT_MAX_PAYLOAD};

    #[test]
    fn stream_sender_frames_payload() {
        let mut sender = StreamSender::new(Cursor::new(Vec::<u8>::new()));
        let holder = OutgoingMessageHolder::new(Bytes::from_static(b"encoded"));
        sender.send_encoded_message(&holder).unwrap();
        // The sender never settles the holder.
        assert_eq!(holder.try_result(), None);

        let wire = sender.writer.take().unwrap().into_inner().into_inner();
        let mut buf = BytesMut::from(wire.as_slice());
        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"encoded");
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_sends() {
        let mut sender = StreamSender::new(Cursor::new(Vec::<u8>::new()));
        sender.close();
        sender.close();
        assert!(sender.is_closed());

        let holder = OutgoingMessageHolder::new(Bytes::from_static(b"x"));
        let err = sender.send_encoded_message(&holder).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn memory_sender_shares_sink() {
        let sink = MemorySink::new();
        let mut sender = MemorySender::new(sink.clone());
        for payload in [&b"a"[..], b"b"] {
            let holder = OutgoingMessageHolder::new(Bytes::copy_from_slice(payload));
            sender.send_encoded_message(&holder).unwrap();
        }
        assert_eq!(sink.payloads(), vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);

        sender.close();
        sender.close();
        let holder = OutgoingMessageHolder::new(Bytes::new());
        assert!(sender.send_encoded_message(&holder).is_err());
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }
}
