use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use malstack_encoding::{StreamFactory, Uri};
use malstack_message::Message;
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;
use crate::diagnostics::{tracing_sink, Diagnostic, DiagnosticSink};
use crate::endpoint::{BatchHandle, Endpoint, MessageTransmitter};
use crate::error::{standard, FrameError, Result, TransmitError, TransportError};
use crate::frame::FrameReader;
use crate::holder::OutgoingMessageHolder;
use crate::sender::MessageSender;
use crate::worker::SenderWorker;

type EndpointTable = Arc<RwLock<HashMap<Uri, Arc<Endpoint>>>>;

/// Hosts endpoints, routes outbound messages to sender bindings by URI
/// prefix and dispatches inbound buffers to endpoints by destination URI.
///
/// Each binding runs on its own worker thread, so writes to one link are
/// serialized while different links proceed in parallel.
pub struct GenericTransport {
    uri_base: String,
    config: TransportConfig,
    core: Arc<TransportCore>,
    inbound: InboundDispatcher,
}

impl GenericTransport {
    /// Transport whose endpoint URIs start with `uri_base`.
    pub fn new(uri_base: impl Into<String>, config: TransportConfig) -> Result<Self> {
        Self::with_diagnostics(uri_base, config, tracing_sink())
    }

    pub fn with_diagnostics(
        uri_base: impl Into<String>,
        config: TransportConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let factory = config.stream_factory()?;
        let uri_base = uri_base.into().trim_end_matches('/').to_string();

        let core = Arc::new(TransportCore {
            factory,
            delivery_timeout: config.delivery_timeout(),
            routes: RwLock::new(Vec::new()),
            diagnostics: Arc::clone(&diagnostics),
            closed: AtomicBool::new(false),
        });
        let inbound = InboundDispatcher {
            factory,
            wrap_body_parts: config.wrap_body_parts,
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            diagnostics,
        };

        info!(%uri_base, encoding = %factory.format(), "transport created");
        Ok(Self {
            uri_base,
            config,
            core,
            inbound,
        })
    }

    pub fn uri_base(&self) -> &str {
        &self.uri_base
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn stream_factory(&self) -> StreamFactory {
        self.core.factory
    }

    /// Create an endpoint at `{uri_base}/{name}`.
    pub fn create_endpoint(&self, name: &str) -> Result<Arc<Endpoint>> {
        if self.core.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let uri = Uri::new(format!("{}/{}", self.uri_base, name));
        let mut endpoints = self
            .inbound
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // close() drains under this lock after setting the flag.
        if self.core.is_closed() {
            return Err(TransportError::Shutdown);
        }
        if endpoints.contains_key(&uri) {
            return Err(TransportError::DuplicateEndpoint(name.to_string()));
        }

        let transmitter: Arc<dyn MessageTransmitter> = self.core.clone();
        let endpoint = Arc::new(Endpoint::new(
            name,
            uri.clone(),
            self.config.wrap_body_parts,
            transmitter,
            Arc::clone(&self.inbound.diagnostics),
        ));
        endpoints.insert(uri, Arc::clone(&endpoint));
        debug!(endpoint = %name, uri = %endpoint.uri(), "endpoint created");
        Ok(endpoint)
    }

    /// Endpoint hosted at `{uri_base}/{name}`, if any.
    pub fn endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        let uri = Uri::new(format!("{}/{}", self.uri_base, name));
        self.inbound.endpoint_for(&uri)
    }

    /// Route destinations under `prefix` to `sender`.
    ///
    /// Replaces any binding registered for the same prefix. The longest
    /// matching prefix wins when several match.
    pub fn register_binding(
        &self,
        prefix: impl Into<Uri>,
        sender: impl MessageSender + 'static,
    ) -> Result<()> {
        if self.core.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let prefix = prefix.into();
        let worker = Arc::new(SenderWorker::spawn(
            prefix.to_string(),
            Box::new(sender),
        )?);

        let replaced = {
            let mut routes = self
                .core
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if self.core.is_closed() {
                drop(routes);
                worker.shutdown();
                return Err(TransportError::Shutdown);
            }
            let existing = routes.iter().position(|route| route.prefix == prefix);
            let route = Route {
                prefix: prefix.clone(),
                worker,
            };
            match existing {
                Some(idx) => Some(std::mem::replace(&mut routes[idx], route)),
                None => {
                    routes.push(route);
                    None
                }
            }
        };
        if let Some(old) = replaced {
            debug!(%prefix, "replacing sender binding");
            old.worker.shutdown();
        }
        info!(%prefix, "sender binding registered");
        Ok(())
    }

    /// Connect a Unix-socket binding for destinations under `prefix`.
    #[cfg(unix)]
    pub fn connect_uds(
        &self,
        prefix: impl Into<Uri>,
        path: impl AsRef<std::path::Path>,
    ) -> Result<()> {
        let sender = crate::sender::UdsSender::connect(path, self.config.frame_config())?;
        self.register_binding(prefix, sender)
    }

    /// Close and forget the binding for exactly `prefix`.
    pub fn remove_binding(&self, prefix: &Uri) -> bool {
        let removed = {
            let mut routes = self
                .core
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            routes
                .iter()
                .position(|route| &route.prefix == prefix)
                .map(|idx| routes.remove(idx))
        };
        match removed {
            Some(route) => {
                route.worker.shutdown();
                true
            }
            None => false,
        }
    }

    /// Encode and transmit one message outside any batch.
    pub fn send_message(&self, message: &Message) -> std::result::Result<(), TransmitError> {
        self.core.transmit(None, true, message)
    }

    /// Decode one inbound buffer and hand it to its endpoint.
    pub fn receive(&self, payload: Bytes) -> Result<()> {
        self.inbound.receive(payload)
    }

    pub fn receive_batch(&self, payloads: Vec<Bytes>) -> Result<()> {
        self.inbound.receive_batch(payloads)
    }

    /// Dispatch frames from `reader` until the peer closes.
    pub fn serve_frames<R: Read>(&self, reader: FrameReader<R>) -> Result<usize> {
        self.inbound.serve(reader)
    }

    /// Inbound half, for use on reader threads.
    pub fn dispatcher(&self) -> InboundDispatcher {
        self.inbound.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Close every endpoint and binding. Later sends fail with SHUTDOWN.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let endpoints: Vec<_> = self
            .inbound
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, endpoint)| endpoint)
            .collect();
        for endpoint in &endpoints {
            endpoint.close();
        }

        let routes = std::mem::take(
            &mut *self
                .core
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for route in &routes {
            route.worker.shutdown();
        }

        info!(
            uri_base = %self.uri_base,
            endpoints = endpoints.len(),
            bindings = routes.len(),
            "transport closed"
        );
    }
}

impl Drop for GenericTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for GenericTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericTransport")
            .field("uri_base", &self.uri_base)
            .field("encoding", &self.core.factory.format().name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Route {
    prefix: Uri,
    worker: Arc<SenderWorker>,
}

struct TransportCore {
    factory: StreamFactory,
    delivery_timeout: Option<Duration>,
    routes: RwLock<Vec<Route>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    closed: AtomicBool,
}

impl TransportCore {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn route(&self, destination: &Uri) -> Option<Arc<SenderWorker>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|route| destination.has_prefix(route.prefix.as_str()))
            .max_by_key(|route| route.prefix.as_str().len())
            .map(|route| Arc::clone(&route.worker))
    }
}

impl MessageTransmitter for TransportCore {
    fn transmit(
        &self,
        handle: Option<BatchHandle>,
        last_for_handle: bool,
        message: &Message,
    ) -> std::result::Result<(), TransmitError> {
        let fail = |number: u32, info: String| {
            TransmitError::new(number, info).with_message(message.clone())
        };

        if self.is_closed() {
            return Err(fail(standard::SHUTDOWN, "transport is closed".into()));
        }

        let destination = message.header().uri_to();
        let payload = message
            .encode(&self.factory)
            .map_err(|err| fail(standard::BAD_ENCODING, err.to_string()))?;
        let worker = self.route(destination).ok_or_else(|| {
            fail(
                standard::DESTINATION_UNKNOWN,
                format!("no binding for {destination}"),
            )
        })?;

        trace!(
            binding = worker.label(),
            ?handle,
            last_for_handle,
            bytes = payload.len(),
            "submitting message"
        );
        let holder = Arc::new(OutgoingMessageHolder::with_diagnostics(
            payload,
            Arc::clone(&self.diagnostics),
        ));
        if worker.submit(Arc::clone(&holder)).is_err() {
            return Err(fail(
                standard::SHUTDOWN,
                format!("binding {} is closed", worker.label()),
            ));
        }

        let sent = match self.delivery_timeout {
            Some(timeout) => holder.get_result_timeout(timeout).ok_or_else(|| {
                fail(
                    standard::DELIVERY_TIMEDOUT,
                    format!("no outcome from {} within {timeout:?}", worker.label()),
                )
            })?,
            None => holder.get_result(),
        };

        if sent {
            Ok(())
        } else {
            Err(fail(
                standard::DELIVERY_FAILED,
                format!("binding {} failed to write message", worker.label()),
            ))
        }
    }
}

/// Decodes inbound buffers and delivers them to the hosted endpoints.
#[derive(Clone)]
pub struct InboundDispatcher {
    factory: StreamFactory,
    wrap_body_parts: bool,
    endpoints: EndpointTable,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl InboundDispatcher {
    pub fn receive(&self, payload: Bytes) -> Result<()> {
        let message = Message::decode(&self.factory, payload, self.wrap_body_parts)?;
        let destination = message.header().uri_to().clone();
        match self.endpoint_for(&destination) {
            Some(endpoint) => endpoint.receive(message),
            None => self.unknown(destination),
        }
        Ok(())
    }

    /// Decode every buffer, then deliver per endpoint in arrival order.
    ///
    /// A buffer that fails to decode rejects the whole batch.
    pub fn receive_batch(&self, payloads: Vec<Bytes>) -> Result<()> {
        let mut groups: Vec<(Uri, Vec<Message>)> = Vec::new();
        for payload in payloads {
            let message = Message::decode(&self.factory, payload, self.wrap_body_parts)?;
            let destination = message.header().uri_to();
            match groups.iter_mut().find(|(uri, _)| *uri == *destination) {
                Some((_, messages)) => messages.push(message),
                None => groups.push((destination.clone(), vec![message])),
            }
        }

        for (destination, messages) in groups {
            match self.endpoint_for(&destination) {
                Some(endpoint) => endpoint.receive_batch(messages),
                None => self.unknown(destination),
            }
        }
        Ok(())
    }

    /// Read frames until the peer closes, delivering each.
    ///
    /// Frames that fail to decode are logged and skipped. Returns the
    /// number of frames read.
    pub fn serve<R: Read>(&self, mut reader: FrameReader<R>) -> Result<usize> {
        let mut frames = 0usize;
        loop {
            match reader.read_frame() {
                Ok(payload) => {
                    frames += 1;
                    if let Err(err) = self.receive(payload) {
                        warn!(error = %err, "dropping undecodable frame");
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    debug!(frames, "inbound stream closed");
                    return Ok(frames);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn endpoint_for(&self, uri: &Uri) -> Option<Arc<Endpoint>> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    fn unknown(&self, uri: Uri) {
        self.diagnostics.record(Diagnostic::UnknownDestination {
            uri: uri.into_string(),
        });
    }
}

impl fmt::Debug for InboundDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundDispatcher")
            .field("encoding", &self.factory.format().name)
            .field("wrap_body_parts", &self.wrap_body_parts)
            .finish()
    }
}
