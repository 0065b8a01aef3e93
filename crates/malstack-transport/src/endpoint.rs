use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use malstack_encoding::Uri;
use malstack_message::{
    HeaderFields, Message, MessageBody, MessageHeader, Operation, OperationFields, QosProperties,
};
use tracing::{debug, trace};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{standard, MultipleTransmitError, TransmitError};

/// Context for a run of sends from one [`Endpoint::send_batch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchHandle(pub u64);

/// The outbound half of a transport, as seen by its endpoints.
pub trait MessageTransmitter: Send + Sync {
    /// Encode and transmit one message, blocking until the binding reports.
    ///
    /// `handle` is the batch context, if any; `last_for_handle` marks the
    /// final message sent under it.
    fn transmit(
        &self,
        handle: Option<BatchHandle>,
        last_for_handle: bool,
        message: &Message,
    ) -> Result<(), TransmitError>;

    /// Acquire a batch context before the first message of a batch.
    fn open_batch(&self, _messages: &[Message]) -> Result<Option<BatchHandle>, TransmitError> {
        Ok(None)
    }

    /// Release a batch context after the last message of a batch.
    fn close_batch(
        &self,
        _handle: Option<BatchHandle>,
        _messages: &[Message],
    ) -> Result<(), TransmitError> {
        Ok(())
    }
}

/// Receives inbound messages delivered to an endpoint.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, endpoint: &Endpoint, message: Message);

    /// Several messages that arrived together. Defaults to one call each.
    fn on_messages(&self, endpoint: &Endpoint, messages: Vec<Message>) {
        for message in messages {
            self.on_message(endpoint, message);
        }
    }
}

impl<F> MessageListener for F
where
    F: Fn(&Endpoint, Message) + Send + Sync,
{
    fn on_message(&self, endpoint: &Endpoint, message: Message) {
        self(endpoint, message)
    }
}

/// A named message source and sink hosted by a transport.
///
/// Inbound delivery is gated: messages reach the listener only while the
/// endpoint is active and a listener is set, and are dropped otherwise.
/// Starts inactive.
pub struct Endpoint {
    name: String,
    uri: Uri,
    wrap_body_parts: bool,
    active: AtomicBool,
    listener: RwLock<Option<Arc<dyn MessageListener>>>,
    transmitter: Arc<dyn MessageTransmitter>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        uri: Uri,
        wrap_body_parts: bool,
        transmitter: Arc<dyn MessageTransmitter>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            name: name.into(),
            uri,
            wrap_body_parts,
            active: AtomicBool::new(false),
            listener: RwLock::new(None),
            transmitter,
            diagnostics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn wrap_body_parts(&self) -> bool {
        self.wrap_body_parts
    }

    /// Begin delivering inbound messages.
    pub fn start(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            debug!(endpoint = %self.name, "message delivery started");
        }
    }

    /// Stop delivering inbound messages; later arrivals are dropped.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            debug!(endpoint = %self.name, "message delivery stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Build a message from this endpoint with explicit header fields.
    pub fn create_message(
        &self,
        fields: HeaderFields,
        body: MessageBody,
        qos_properties: QosProperties,
    ) -> malstack_message::Result<Message> {
        let header = MessageHeader::new(self.uri.clone(), fields)?;
        Ok(Message::new(header, body, qos_properties, self.wrap_body_parts))
    }

    /// Build a message from this endpoint for the operation `op`.
    pub fn create_message_for_operation(
        &self,
        op: &Operation,
        fields: OperationFields,
        body: MessageBody,
        qos_properties: QosProperties,
    ) -> malstack_message::Result<Message> {
        let header = MessageHeader::for_operation(self.uri.clone(), op, fields)?;
        Ok(Message::new(header, body, qos_properties, self.wrap_body_parts))
    }

    /// Transmit one message.
    pub fn send(&self, message: &Message) -> Result<(), TransmitError> {
        self.transmitter.transmit(None, true, message)
    }

    /// Transmit every message in order, collecting failures.
    ///
    /// A failure does not stop the batch. If the batch context cannot be
    /// acquired nothing is sent.
    pub fn send_batch(&self, messages: &[Message]) -> Result<(), MultipleTransmitError> {
        let mut errors = Vec::new();

        match self.transmitter.open_batch(messages) {
            Ok(handle) => {
                for (idx, message) in messages.iter().enumerate() {
                    let last = idx + 1 == messages.len();
                    if let Err(err) = self.transmitter.transmit(handle, last, message) {
                        errors.push(err);
                    }
                }
                if let Err(err) = self.transmitter.close_batch(handle, messages) {
                    errors.push(internal(err));
                }
            }
            Err(err) => errors.push(internal(err)),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(
                endpoint = %self.name,
                failed = errors.len(),
                total = messages.len(),
                "batch send incomplete"
            );
            Err(MultipleTransmitError { errors })
        }
    }

    /// Hand an inbound message to the listener, or drop it.
    pub fn receive(&self, message: Message) {
        match self.deliverable() {
            Some(listener) => {
                trace!(endpoint = %self.name, "delivering message");
                listener.on_message(self, message);
            }
            None => self.record_drop(1),
        }
    }

    /// Hand several inbound messages to the listener at once, or drop them.
    pub fn receive_batch(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        match self.deliverable() {
            Some(listener) => {
                trace!(endpoint = %self.name, count = messages.len(), "delivering messages");
                listener.on_messages(self, messages);
            }
            None => self.record_drop(messages.len()),
        }
    }

    /// Replace the listener. Takes effect for the next delivery.
    pub fn set_listener(&self, listener: Arc<dyn MessageListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn has_listener(&self) -> bool {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop delivery and release the listener.
    pub fn close(&self) {
        self.stop();
        self.listener
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(endpoint = %self.name, "endpoint closed");
    }

    // The listener is cloned out so it runs without the lock held.
    fn deliverable(&self) -> Option<Arc<dyn MessageListener>> {
        if !self.is_active() {
            return None;
        }
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_drop(&self, count: usize) {
        self.diagnostics.record(Diagnostic::MessageDropped {
            endpoint: self.name.clone(),
            active: self.is_active(),
            has_listener: self.has_listener(),
            count,
        });
    }
}

fn internal(err: TransmitError) -> TransmitError {
    TransmitError {
        number: standard::INTERNAL,
        ..err
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("active", &self.is_active())
            .field("has_listener", &self.has_listener())
            .finish()
    }
}
